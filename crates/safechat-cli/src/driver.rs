//! Generation driver
//!
//! For each dialog: check the first turn, generate, check the output.
//!
//! ```text
//! INPUT_CHECK --safe--> GENERATE --> OUTPUT_CHECK --> DONE
//!      |
//!      +--unsafe--> abort the whole run
//! ```
//!
//! An unsafe user prompt stops the run with [`Error::UnsafeInput`]. An
//! unsafe model output is reported and the driver moves on to the next
//! dialog.

use safechat_core::{Dialog, Error, Result};
use safechat_runtime::{ChatModel, GenerationContext, GenerationRequest};
use safechat_safety::{SafetyCheckerSet, SafetyReport};
use std::io::Write;

pub const SEPARATOR: &str = "\n==================================\n";

/// Outcome of a run that was not aborted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Dialogs whose prompt passed and were generated for
    pub generated: usize,

    /// Generated outputs flagged by at least one checker
    pub unsafe_outputs: usize,
}

/// Echo the dialogs about to be processed
pub fn print_dialogs<W: Write>(dialogs: &[Dialog], out: &mut W) -> Result<()> {
    let rendered: Vec<String> = dialogs.iter().map(ToString::to_string).collect();
    writeln!(out, "User dialogs:\n[{}]", rendered.join(", "))?;
    writeln!(out, "{}", SEPARATOR)?;
    Ok(())
}

fn print_failures<W: Write>(report: &SafetyReport, out: &mut W) -> Result<()> {
    for failure in report.failures() {
        writeln!(out, "{}", failure.checker)?;
        writeln!(out, "{}", failure.report)?;
    }
    Ok(())
}

/// Run every dialog through input check, generation and output check
pub async fn run_dialogs<M, W>(
    dialogs: &[Dialog],
    model: &mut M,
    checkers: &SafetyCheckerSet,
    ctx: &mut GenerationContext,
    out: &mut W,
) -> Result<RunSummary>
where
    M: ChatModel,
    W: Write,
{
    let chats = dialogs
        .iter()
        .map(|dialog| model.apply_chat_template(dialog))
        .collect::<Result<Vec<_>>>()?;

    let mut summary = RunSummary::default();

    for (idx, (dialog, chat)) in dialogs.iter().zip(chats).enumerate() {
        let prompt = dialog.prompt();

        let input_report = checkers.check(prompt).await?;
        if input_report.is_safe() {
            writeln!(out, "User prompt deemed safe.")?;
            writeln!(out, "User prompt:\n {}", prompt)?;
            writeln!(out, "{}", SEPARATOR)?;
        } else {
            writeln!(out, "User prompt deemed unsafe.")?;
            print_failures(&input_report, out)?;
            writeln!(out, "Skipping the inferece as the prompt is not safe.")?;
            out.flush()?;
            tracing::warn!(dialog = idx, "Unsafe user prompt, aborting run");
            return Err(Error::UnsafeInput { dialog: idx });
        }

        let request = GenerationRequest::new(chat);
        let output = model.generate(&request, ctx)?;
        metrics::counter!("safechat_generations_total").increment(1);
        summary.generated += 1;

        let output_text = model.decode(&output)?;

        let output_report = checkers.check(&output_text).await?;
        if output_report.is_safe() {
            writeln!(out, "User input and model output deemed safe.")?;
            writeln!(out, "Model output:\n{}", output_text)?;
            writeln!(out, "{}", SEPARATOR)?;
        } else {
            writeln!(out, "Model output deemed unsafe.")?;
            print_failures(&output_report, out)?;
            summary.unsafe_outputs += 1;
            tracing::warn!(dialog = idx, "Unsafe model output");
        }
        out.flush()?;
    }

    Ok(summary)
}
