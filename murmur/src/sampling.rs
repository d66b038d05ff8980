//! Token sampling from logits
//!
//! One generation step turns a row of logits into a token: divide by
//! temperature, reduce to a max, subtract it, exponentiate and reduce to a
//! normalizing constant, truncate to the top-K tokens and the top-P
//! nucleus, then draw from the remaining distribution with a seeded PRNG.
//!
//! The max/normalizer reductions go through [`crate::dispatch::reduce`],
//! so the same kernels that back normalization elsewhere drive sampling.
//! The `SumExp` kernel exponentiates its input as given; the max
//! subtraction here is what keeps large logits from overflowing.

#![allow(clippy::cast_possible_truncation)]

use rand::rngs::StdRng;
use rand::Rng;

use crate::dispatch::reduce;
use crate::error::{Error, Result};
use crate::reduce::ReduceOp;
use crate::tensor::Tensor;

/// Sampling configuration for one completion.
///
/// Immutable once a completion starts. Out-of-range values are rejected by
/// [`CompletionConfig::validate`], never clamped.
#[derive(Debug, Clone, Copy)]
pub struct CompletionConfig {
    /// Nucleus probability threshold in `(0, 1]`.
    pub top_p: f32,
    /// Number of highest-probability tokens kept before nucleus
    /// truncation. Must be >= 1.
    pub top_k: usize,
    /// Logit scaling factor, must be > 0. Higher is more random.
    pub temperature: f32,
    /// PRNG seed. Same seed + same model + same prompt → same output.
    pub seed: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            top_p: 0.8,
            top_k: 50,
            temperature: 1.0,
            seed: 42,
        }
    }
}

impl CompletionConfig {
    /// Check every field is in range.
    ///
    /// # Errors
    /// Returns `InvalidConfig` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "top_p must be in (0, 1], got {}",
                self.top_p
            )));
        }
        if self.top_k < 1 {
            return Err(Error::InvalidConfig("top_k must be >= 1".to_string()));
        }
        if !(self.temperature > 0.0 && self.temperature.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "temperature must be > 0, got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

/// Reusable scratch buffers for sampling.
///
/// Each completion owns its own workspace; nothing here is shared across
/// completions, so concurrent generation over one model stays race-free.
#[derive(Default)]
pub struct SampleWorkspace {
    shifted: Vec<f32>,
    candidates: Vec<(u32, f32)>,
}

impl SampleWorkspace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Draw the next token from a single row of logits.
///
/// `logits` may live on any device with a `Max` reduction kernel; the row
/// is pulled to the host for truncation and the draw. Ties truncate and
/// resolve deterministically: candidates are ordered by probability
/// descending, then token ID ascending.
///
/// # Errors
/// `InvalidShape` if `logits` is not a single row, `Boundary` if the model
/// produced non-finite logits, plus any kernel dispatch error.
pub fn sample_next_token(
    logits: &Tensor,
    config: &CompletionConfig,
    rng: &mut StdRng,
    ws: &mut SampleWorkspace,
) -> Result<u32> {
    let vocab = logits.axis_len();
    if logits.rank() == 0 || logits.numel() != vocab || vocab == 0 {
        return Err(Error::InvalidShape(format!(
            "expected a single row of logits, got shape {:?}",
            logits.shape()
        )));
    }

    // Max on the logits' own device; order is preserved under the
    // positive temperature scaling, so the scaled max is max / t.
    let max = reduce(logits, ReduceOp::Max)?.to_f32_vec()?[0];
    if !max.is_finite() {
        return Err(Error::Boundary(
            "model produced non-finite logits".to_string(),
        ));
    }

    let host = logits.to_f32_vec()?;
    let t = config.temperature;
    let shifted_max = max / t;
    ws.shifted.clear();
    ws.shifted.extend(host.iter().map(|&x| x / t - shifted_max));

    let shifted = Tensor::from_f32(&[vocab], &ws.shifted);
    let z = reduce(&shifted, ReduceOp::SumExp)?.to_f32_vec()?[0];
    if !(z.is_finite() && z > 0.0) {
        return Err(Error::Boundary(
            "model produced non-finite logits".to_string(),
        ));
    }

    ws.candidates.clear();
    ws.candidates.extend(
        ws.shifted
            .iter()
            .enumerate()
            .map(|(i, &s)| (i as u32, s.exp() / z)),
    );
    ws.candidates.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    ws.candidates.truncate(config.top_k.min(vocab));

    // Nucleus: the smallest prefix whose cumulative probability reaches
    // top_p.
    let mut cumulative = 0.0f32;
    let mut cutoff = ws.candidates.len();
    for (i, &(_, p)) in ws.candidates.iter().enumerate() {
        cumulative += p;
        if cumulative >= config.top_p {
            cutoff = i + 1;
            break;
        }
    }
    let nucleus = &ws.candidates[..cutoff];
    let nucleus_sum: f32 = nucleus.iter().map(|&(_, p)| p).sum();

    let u: f32 = rng.gen();
    let mut acc = 0.0f32;
    for &(id, p) in nucleus {
        acc += p / nucleus_sum;
        if u < acc {
            return Ok(id);
        }
    }
    // Rounding can leave acc slightly below 1.
    Ok(nucleus[nucleus.len() - 1].0)
}
