//! Interactive completion loop
//!
//! Usage:
//!   murmur -m model.json [-d cpu|cuda|auto]
//!
//! Reads a query per line, streams the completion's chunks as they are
//! generated and prints a token-rate line after each turn. A failed turn
//! prints its error and keeps the loop alive for the next prompt.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;

use murmur::sampling::CompletionConfig;
use murmur::{Device, LanguageModel};
use murmur_runtime::{Session, TokenRateReport};
use murmur_tiny::{TinyLm, TinyLmConfig, TinyTokenizer};

/// Command line interface for murmur
#[derive(Parser)]
#[command(name = "murmur")]
struct Cli {
    /// Path to the model config JSON
    #[arg(short, long)]
    model: PathBuf,

    /// Device to run on (cpu|cuda|auto)
    #[arg(short, long, default_value = "auto")]
    device: String,

    /// Nucleus sampling threshold
    #[arg(short = 'p', long, default_value_t = 0.8)]
    top_p: f32,

    /// Number of highest-probability tokens kept before nucleus truncation
    #[arg(short = 'k', long, default_value_t = 50)]
    top_k: usize,

    /// Sampling temperature
    #[arg(short, long, default_value_t = 1.0)]
    temperature: f32,

    /// RNG seed for sampling
    #[arg(short, long, default_value_t = 42)]
    seed: u64,
}

/// Run one generation turn, streaming chunks to stdout.
fn run_turn(
    session: &Session,
    bos: Option<&str>,
    query: &str,
    config: CompletionConfig,
) -> murmur::Result<TokenRateReport> {
    let prompt = session.prompt();
    if let Some(bos) = bos {
        prompt.append_control_token(bos)?;
    }
    prompt.append_text(query)?;

    let mut completion = session.complete(&prompt, config);
    completion.start()?;

    let start = Instant::now();
    while completion.is_active() {
        let chunk = completion.next_chunk()?;
        print!("{}", chunk.text());
        io::stdout().flush()?;
    }
    Ok(TokenRateReport::new(completion.generated(), start.elapsed()))
}

fn main() -> murmur::Result<()> {
    let cli = Cli::parse();
    let device: Device = cli.device.parse()?;

    let text = std::fs::read_to_string(&cli.model)?;
    let model_config = TinyLmConfig::from_json(&text)?;
    let model = Arc::new(TinyLm::new(&model_config, device)?);
    let tokenizer = Arc::new(TinyTokenizer::new(&model_config));

    println!("Loaded {} on {}", model.name(), model.device());
    let session = Session::new(model, tokenizer);

    let config = CompletionConfig {
        top_p: cli.top_p,
        top_k: cli.top_k,
        temperature: cli.temperature,
        seed: cli.seed,
    };

    print!("> ");
    io::stdout().flush()?;
    for line in io::stdin().lock().lines() {
        let query = line?;
        if !query.trim().is_empty() {
            match run_turn(&session, model_config.bos_token.as_deref(), query.trim(), config) {
                Ok(report) => {
                    println!();
                    println!("{report}");
                }
                Err(e) => {
                    println!();
                    println!("error: {e}");
                }
            }
        }
        print!("> ");
        io::stdout().flush()?;
    }
    Ok(())
}
