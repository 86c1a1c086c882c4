//! Run orchestration: resolve input, load models, drive the dialogs

use crate::config::RunConfig;
use crate::driver::{print_dialogs, run_dialogs, RunSummary};
use safechat_core::{Dialog, DialogSource, Error, Result};
use safechat_runtime::{CausalLmRuntime, ChatModel, GenerationContext, ModelSettings};
use safechat_safety::{SafetyCheckerSet, SafetyConfig};
use std::io::{BufRead, Write};

/// Printed when piped input is not a JSON array of dialogs
pub const STDIN_PARSE_MESSAGE: &str =
    "Could not parse json from stdin. Please provide a json file with the user prompts. Exiting.";

/// Printed when there is neither a prompt file nor piped input
pub const NO_INPUT_MESSAGE: &str = "No user prompt provided. Exiting.";

/// Loads the model and checkers of a run
pub trait Backend {
    type Model: ChatModel;

    fn load_model(&self, settings: &ModelSettings) -> Result<Self::Model>;

    fn load_checkers(&self, config: &SafetyConfig) -> Result<SafetyCheckerSet>;
}

/// Candle-backed models and the configured checkers
#[derive(Debug, Clone, Copy, Default)]
pub struct CandleBackend;

impl Backend for CandleBackend {
    type Model = CausalLmRuntime;

    fn load_model(&self, settings: &ModelSettings) -> Result<CausalLmRuntime> {
        CausalLmRuntime::load(settings)
    }

    fn load_checkers(&self, config: &SafetyConfig) -> Result<SafetyCheckerSet> {
        SafetyCheckerSet::from_config(config)
    }
}

/// Resolve the dialogs, printing the user-facing message on failure
pub fn load_dialogs<R: BufRead, W: Write>(
    prompt_file: Option<&std::path::Path>,
    stdin: R,
    stdin_is_terminal: bool,
    out: &mut W,
) -> Result<Vec<Dialog>> {
    let result = DialogSource::detect(prompt_file, stdin_is_terminal).and_then(|source| {
        tracing::debug!(?source, "Resolved dialog source");
        source.read_with(stdin).map_err(|e| match (&source, e) {
            (DialogSource::Stdin, Error::InputParse(detail)) => {
                tracing::debug!("stdin parse error: {}", detail);
                Error::InputParse(STDIN_PARSE_MESSAGE.to_string())
            }
            (DialogSource::File(path), Error::InputParse(detail)) => Error::InputParse(format!(
                "Could not parse json from {}: {}",
                path.display(),
                detail
            )),
            (_, e) => e,
        })
    });

    if let Err(err) = &result {
        let message = match err {
            Error::NoInput => NO_INPUT_MESSAGE.to_string(),
            Error::InputParse(detail) => detail.clone(),
            other => other.to_string(),
        };
        writeln!(out, "{}", message)?;
    }
    result
}

/// Run the whole pipeline.
///
/// Dialog input is resolved before anything is loaded, so input errors
/// never pay for a model load.
pub async fn run<B, R, W>(
    config: &RunConfig,
    backend: &B,
    stdin: R,
    stdin_is_terminal: bool,
    out: &mut W,
) -> Result<RunSummary>
where
    B: Backend,
    R: BufRead,
    W: Write,
{
    let dialogs = load_dialogs(config.prompt_file.as_deref(), stdin, stdin_is_terminal, out)?;
    print_dialogs(&dialogs, out)?;

    let mut ctx = GenerationContext::new(config.seed, config.generation.clone());

    let mut model = backend.load_model(&config.model)?;
    let checkers = backend.load_checkers(&config.safety)?;
    tracing::info!(
        dialogs = dialogs.len(),
        checkers = ?checkers.names(),
        "Starting chat completion"
    );

    let summary = run_dialogs(&dialogs, &mut model, &checkers, &mut ctx, out).await?;
    tracing::info!(
        generated = summary.generated,
        unsafe_outputs = summary.unsafe_outputs,
        "Chat completion finished"
    );
    Ok(summary)
}
