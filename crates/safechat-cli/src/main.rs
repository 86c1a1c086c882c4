//! chat-completion
//!
//! Reads dialogs from a prompt file or stdin, screens each user prompt with
//! the enabled safety checkers, generates a completion and screens the
//! output as well.

use anyhow::Result;
use clap::Parser;
use safechat_cli::{CandleBackend, Cli, RunConfig};
use safechat_core::Error;
use std::io::IsTerminal;
use tracing::{error, info};

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);
    describe_metrics();

    let config = RunConfig::load(&cli)?;
    info!("Configuration loaded successfully");
    info!("Model: {}", config.model.model_id);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let stdin = std::io::stdin();
    let stdin_is_terminal = stdin.is_terminal();
    let mut stdout = std::io::stdout().lock();

    let outcome = runtime.block_on(safechat_cli::run(
        &config,
        &CandleBackend,
        stdin.lock(),
        stdin_is_terminal,
        &mut stdout,
    ));

    match outcome {
        Ok(_) => Ok(()),
        // Already reported on stdout
        Err(e) if e.is_input_error() || matches!(e, Error::UnsafeInput { .. }) => {
            std::process::exit(1)
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1)
        }
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Log directives used when `RUST_LOG` is unset
fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "safechat=debug"
    } else {
        "safechat=info"
    }
}

/// Describe the metrics emitted during a run; no exporter is installed
fn describe_metrics() {
    metrics::describe_counter!(
        "safechat_safety_checks_total",
        "Safety checks run, by checker and verdict"
    );
    metrics::describe_counter!("safechat_generations_total", "Completions generated");
    metrics::describe_counter!(
        "safechat_generated_tokens_total",
        "Tokens produced by the chat model"
    );
    metrics::describe_histogram!(
        "safechat_safety_latency_us",
        metrics::Unit::Microseconds,
        "Time spent running a checker set on one text"
    );
    metrics::describe_histogram!(
        "safechat_model_load_ms",
        metrics::Unit::Milliseconds,
        "Model load time"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(default_directives(false), "safechat=info");
        assert_eq!(default_directives(true), "safechat=debug");
    }
}
