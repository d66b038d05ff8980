//! Generation session state machine
//!
//! A completion moves through `Frozen → Running → Exhausted | Failed`;
//! its prompt is mutable only before the completion is created. Every
//! `next_chunk` call blocks for exactly one generation step (forward pass,
//! reductions, sampling, detokenization); chunks are strictly ordered
//! because each step feeds on the token the previous one produced.
//!
//! There is no background thread: dropping a completion is cancellation.
//! Completions over the same model may run from different threads; each
//! owns its private sampling workspace and RNG.

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::SeedableRng;

use murmur::error;
use murmur::sampling::{self, CompletionConfig, SampleWorkspace};
use murmur::{Error, LanguageModel, Result, Tokenizer};

/// Owns a loaded model and tokenizer, shared by prompts and completions.
///
/// Cloning is cheap; all clones share the same model.
#[derive(Clone)]
pub struct Session {
    model: Arc<dyn LanguageModel>,
    tokenizer: Arc<dyn Tokenizer>,
}

impl Session {
    #[must_use]
    pub fn new(model: Arc<dyn LanguageModel>, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { model, tokenizer }
    }

    /// Name of the loaded model, e.g. "llama".
    #[must_use]
    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Start building a new prompt.
    #[must_use]
    pub fn prompt(&self) -> Prompt {
        Prompt {
            tokenizer: Arc::clone(&self.tokenizer),
            inner: Arc::new(Mutex::new(PromptInner {
                tokens: Vec::new(),
                frozen: false,
            })),
        }
    }

    /// Create a completion over `prompt` with the given sampling config.
    ///
    /// Freezes the prompt: further `append_*` calls fail with a usage
    /// error. The returned completion holds strong references to the model
    /// and tokenizer, so neither can be torn down mid-generation. Call
    /// [`Completion::start`] before pulling chunks.
    #[must_use]
    pub fn complete(&self, prompt: &Prompt, config: CompletionConfig) -> Completion {
        let tokens = {
            let mut inner = prompt.inner.lock().unwrap();
            inner.frozen = true;
            inner.tokens.clone()
        };
        Completion {
            model: Arc::clone(&self.model),
            tokenizer: Arc::clone(&self.tokenizer),
            config,
            state: State::Frozen,
            rng: StdRng::seed_from_u64(config.seed),
            workspace: SampleWorkspace::new(),
            tokens,
            generated: 0,
            last_error: None,
        }
    }
}

struct PromptInner {
    tokens: Vec<u32>,
    frozen: bool,
}

/// A token sequence under construction.
///
/// Mutable until the first completion is created over it, frozen
/// afterwards.
pub struct Prompt {
    tokenizer: Arc<dyn Tokenizer>,
    pub(crate) inner: Arc<Mutex<PromptInner>>,
}

impl Prompt {
    /// Append encoded text to the prompt.
    ///
    /// # Errors
    /// `Usage` if the prompt is frozen, or a tokenizer error.
    pub fn append_text(&self, text: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.frozen {
            return Err(Error::Usage(
                "prompt is frozen: a completion has already been created over it".to_string(),
            ));
        }
        let ids = self.tokenizer.encode(text)?;
        inner.tokens.extend(ids);
        Ok(())
    }

    /// Append a control token by name.
    ///
    /// # Errors
    /// `Usage` if the prompt is frozen, or a tokenizer error.
    pub fn append_control_token(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.frozen {
            return Err(Error::Usage(
                "prompt is frozen: a completion has already been created over it".to_string(),
            ));
        }
        let id = self.tokenizer.control_token_id(name)?;
        inner.tokens.push(id);
        Ok(())
    }

    /// Number of tokens collected so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One unit of streamed decoded text.
#[derive(Debug, Clone)]
pub struct Chunk {
    text: String,
}

impl Chunk {
    /// The decoded text. Empty for the terminal chunk of an exhausted
    /// completion.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Frozen,
    Running,
    Exhausted,
    Failed,
}

/// One generation run over a frozen prompt.
pub struct Completion {
    model: Arc<dyn LanguageModel>,
    tokenizer: Arc<dyn Tokenizer>,
    config: CompletionConfig,
    state: State,
    rng: StdRng,
    workspace: SampleWorkspace,
    tokens: Vec<u32>,
    generated: usize,
    last_error: Option<String>,
}

impl Completion {
    /// Validate the config and begin generating.
    ///
    /// # Errors
    /// `Usage` if the completion was already started; `InvalidConfig` if a
    /// sampling parameter is out of range, in which case the completion
    /// transitions to the failed state and cannot be restarted.
    pub fn start(&mut self) -> Result<()> {
        if self.state != State::Frozen {
            return Err(Error::Usage(
                "completion has already been started".to_string(),
            ));
        }
        if let Err(e) = self.config.validate() {
            self.fail(&e);
            return Err(e);
        }
        self.state = State::Running;
        Ok(())
    }

    /// Whether the completion is still producing chunks.
    ///
    /// False before `start()`, after exhaustion and after a failure.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == State::Running
    }

    /// Run one generation step and return its chunk.
    ///
    /// On the stop condition (EOS token or the model's context limit) the
    /// returned chunk has empty text and the completion becomes inactive.
    ///
    /// # Errors
    /// `Usage` when the completion is not active. Any kernel or boundary
    /// failure moves the completion to the failed state, records the
    /// message (see [`Completion::last_error`] and
    /// [`murmur::error::last_error_message`]) and propagates; do not call
    /// `next_chunk` again afterwards.
    pub fn next_chunk(&mut self) -> Result<Chunk> {
        if !self.is_active() {
            return Err(Error::Usage(
                "next_chunk called on an inactive completion".to_string(),
            ));
        }
        match self.step() {
            Ok(chunk) => Ok(chunk),
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    fn step(&mut self) -> Result<Chunk> {
        if self.tokens.len() >= self.model.max_context_len() {
            self.state = State::Exhausted;
            return Ok(Chunk {
                text: String::new(),
            });
        }

        let logits = self.model.forward_step(&self.tokens)?;
        let next = sampling::sample_next_token(
            &logits,
            &self.config,
            &mut self.rng,
            &mut self.workspace,
        )?;

        if next == self.model.eos_token_id() {
            self.state = State::Exhausted;
            return Ok(Chunk {
                text: String::new(),
            });
        }

        self.tokens.push(next);
        self.generated += 1;
        let text = self.tokenizer.decode_token(next)?;
        Ok(Chunk { text })
    }

    fn fail(&mut self, e: &Error) {
        self.state = State::Failed;
        self.last_error = Some(e.to_string());
        error::record(e);
    }

    /// The message of the failure that stopped this completion, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Number of tokens generated so far (prompt excluded).
    #[must_use]
    pub fn generated(&self) -> usize {
        self.generated
    }

    /// The full token history: prompt plus generated tokens.
    #[must_use]
    pub fn tokens(&self) -> &[u32] {
        &self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur::{Device, Tensor};

    /// Tokenizer over a fixed word list; token 0 is EOS.
    struct WordTokenizer {
        words: Vec<&'static str>,
    }

    impl WordTokenizer {
        fn new() -> Self {
            Self {
                words: vec!["</s>", "hello", "world", "again"],
            }
        }
    }

    impl Tokenizer for WordTokenizer {
        fn encode(&self, text: &str) -> Result<Vec<u32>> {
            text.split_whitespace()
                .map(|w| {
                    self.words
                        .iter()
                        .position(|&v| v == w)
                        .map(|i| i as u32)
                        .ok_or_else(|| Error::Tokenizer(format!("unknown word \"{w}\"")))
                })
                .collect()
        }

        fn control_token_id(&self, name: &str) -> Result<u32> {
            self.encode(name).map(|ids| ids[0])
        }

        fn decode_token(&self, id: u32) -> Result<String> {
            self.words
                .get(id as usize)
                .map(|w| format!(" {w}"))
                .ok_or_else(|| Error::Tokenizer(format!("token {id} out of range")))
        }
    }

    /// Deterministic model: always prefers `last_token + 1`, wrapping to
    /// EOS after the last vocabulary entry.
    struct CycleModel {
        vocab: usize,
        max_len: usize,
    }

    impl LanguageModel for CycleModel {
        fn name(&self) -> &str {
            "cycle"
        }

        fn device(&self) -> Device {
            Device::Cpu
        }

        fn vocab_size(&self) -> usize {
            self.vocab
        }

        fn eos_token_id(&self) -> u32 {
            0
        }

        fn max_context_len(&self) -> usize {
            self.max_len
        }

        fn forward_step(&self, tokens: &[u32]) -> Result<Tensor> {
            let last = *tokens
                .last()
                .ok_or_else(|| Error::Boundary("empty token sequence".to_string()))?;
            let next = (last as usize + 1) % self.vocab;
            let mut logits = vec![0.0f32; self.vocab];
            logits[next] = 10.0;
            Ok(Tensor::from_f32(&[self.vocab], &logits))
        }
    }

    /// Model whose forward pass always fails.
    struct BrokenModel;

    impl LanguageModel for BrokenModel {
        fn name(&self) -> &str {
            "broken"
        }

        fn device(&self) -> Device {
            Device::Cpu
        }

        fn vocab_size(&self) -> usize {
            4
        }

        fn eos_token_id(&self) -> u32 {
            0
        }

        fn max_context_len(&self) -> usize {
            64
        }

        fn forward_step(&self, _tokens: &[u32]) -> Result<Tensor> {
            Err(Error::Boundary("forward pass failed".to_string()))
        }
    }

    fn greedy() -> CompletionConfig {
        CompletionConfig {
            top_k: 1,
            top_p: 1.0,
            temperature: 1.0,
            seed: 0,
        }
    }

    fn cycle_session() -> Session {
        Session::new(
            Arc::new(CycleModel {
                vocab: 4,
                max_len: 32,
            }),
            Arc::new(WordTokenizer::new()),
        )
    }

    #[test]
    fn test_append_then_freeze() {
        let session = cycle_session();
        let prompt = session.prompt();
        prompt.append_text("hello world").unwrap();
        assert_eq!(prompt.len(), 2);

        let _completion = session.complete(&prompt, greedy());
        let err = prompt.append_text("again").unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
        let err = prompt.append_control_token("</s>").unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
        assert_eq!(prompt.len(), 2);
    }

    #[test]
    fn test_next_chunk_before_start_is_usage_error() {
        let session = cycle_session();
        let prompt = session.prompt();
        prompt.append_text("hello").unwrap();
        let mut completion = session.complete(&prompt, greedy());
        assert!(!completion.is_active());
        assert!(matches!(completion.next_chunk(), Err(Error::Usage(_))));
    }

    #[test]
    fn test_double_start_is_usage_error() {
        let session = cycle_session();
        let prompt = session.prompt();
        prompt.append_text("hello").unwrap();
        let mut completion = session.complete(&prompt, greedy());
        completion.start().unwrap();
        assert!(matches!(completion.start(), Err(Error::Usage(_))));
    }

    #[test]
    fn test_invalid_config_fails_the_completion() {
        let session = cycle_session();
        let prompt = session.prompt();
        prompt.append_text("hello").unwrap();
        let mut completion = session.complete(
            &prompt,
            CompletionConfig {
                top_p: 2.0,
                ..greedy()
            },
        );
        let err = completion.start().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(!completion.is_active());
        // Failed, not restartable; next_chunk is a usage error.
        assert!(matches!(completion.next_chunk(), Err(Error::Usage(_))));
        assert!(completion.last_error().unwrap().contains("top_p"));
    }

    #[test]
    fn test_greedy_generation_until_eos() {
        let session = cycle_session();
        let prompt = session.prompt();
        // "hello" is token 1; the cycle model then prefers 2, 3, 0 (EOS).
        prompt.append_text("hello").unwrap();
        let mut completion = session.complete(&prompt, greedy());
        completion.start().unwrap();

        let mut texts = Vec::new();
        while completion.is_active() {
            texts.push(completion.next_chunk().unwrap().text().to_string());
        }
        assert_eq!(texts, vec![" world", " again", ""]);
        assert_eq!(completion.generated(), 2);
        assert_eq!(completion.tokens(), &[1, 2, 3]);
        assert!(!completion.is_active());
    }

    #[test]
    fn test_generation_is_reproducible() {
        let run = || {
            let session = cycle_session();
            let prompt = session.prompt();
            prompt.append_text("hello").unwrap();
            let mut completion = session.complete(&prompt, greedy());
            completion.start().unwrap();
            let mut out = Vec::new();
            while completion.is_active() {
                out.push(completion.next_chunk().unwrap().text().to_string());
            }
            out
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_length_limit_exhausts() {
        let session = Session::new(
            Arc::new(CycleModel {
                vocab: 4,
                max_len: 3,
            }),
            Arc::new(WordTokenizer::new()),
        );
        let prompt = session.prompt();
        prompt.append_text("hello world").unwrap();
        let mut completion = session.complete(&prompt, greedy());
        completion.start().unwrap();

        // One step fits (2 prompt tokens + 1), then the limit stops it.
        let c1 = completion.next_chunk().unwrap();
        assert_eq!(c1.text(), " again");
        let c2 = completion.next_chunk().unwrap();
        assert_eq!(c2.text(), "");
        assert!(!completion.is_active());
    }

    #[test]
    fn test_boundary_failure_transitions_to_failed() {
        let session = Session::new(Arc::new(BrokenModel), Arc::new(WordTokenizer::new()));
        let prompt = session.prompt();
        prompt.append_text("hello").unwrap();
        let mut completion = session.complete(&prompt, greedy());
        completion.start().unwrap();

        let err = completion.next_chunk().unwrap_err();
        assert!(matches!(err, Error::Boundary(_)));
        assert!(!completion.is_active());
        assert_eq!(
            completion.last_error(),
            Some("boundary call failed: forward pass failed")
        );
        // The additive diagnostic slot saw it too. Tests in this process
        // run in parallel and share the slot, so only presence is checked
        // here; exact content is covered by the slot's own unit tests.
        assert!(error::last_error_message().is_some());
        // No retry: further pulls are usage errors.
        assert!(matches!(completion.next_chunk(), Err(Error::Usage(_))));
    }

    #[test]
    fn test_concurrent_completions_share_one_model() {
        let session = cycle_session();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let session = session.clone();
            handles.push(std::thread::spawn(move || {
                let prompt = session.prompt();
                prompt.append_text("hello").unwrap();
                let mut completion = session.complete(&prompt, greedy());
                completion.start().unwrap();
                let mut out = Vec::new();
                while completion.is_active() {
                    out.push(completion.next_chunk().unwrap().text().to_string());
                }
                out
            }));
        }
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for r in &results {
            assert_eq!(r, &results[0]);
        }
    }

    #[test]
    fn test_multiple_completions_from_one_prompt() {
        let session = cycle_session();
        let prompt = session.prompt();
        prompt.append_text("hello").unwrap();
        let mut a = session.complete(&prompt, greedy());
        let mut b = session.complete(&prompt, greedy());
        a.start().unwrap();
        b.start().unwrap();
        assert_eq!(a.next_chunk().unwrap().text(), b.next_chunk().unwrap().text());
    }
}
