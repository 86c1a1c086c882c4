//! Dialog input resolution
//!
//! Dialogs come from exactly one place: a prompt file named on the command
//! line, or a JSON document piped on standard input. Both carry a JSON array
//! of dialogs, each dialog being an array of `{"role", "content"}` turns.

use crate::error::{Error, Result};
use crate::types::Dialog;
use std::io::{BufRead, IsTerminal};
use std::path::{Path, PathBuf};

/// Where the dialogs are read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogSource {
    /// A prompt file on disk
    File(PathBuf),
    /// Piped standard input
    Stdin,
}

impl DialogSource {
    /// Pick the dialog source.
    ///
    /// A prompt file takes precedence and must exist. Without one, stdin is
    /// only used when it is not attached to a terminal.
    pub fn detect(prompt_file: Option<&Path>, stdin_is_terminal: bool) -> Result<Self> {
        match prompt_file {
            Some(path) if !path.exists() => Err(Error::InputNotFound(path.to_path_buf())),
            Some(path) => Ok(Self::File(path.to_path_buf())),
            None if !stdin_is_terminal => Ok(Self::Stdin),
            None => Err(Error::NoInput),
        }
    }

    /// Read dialogs from this source, using `stdin` for [`DialogSource::Stdin`]
    pub fn read_with<R: BufRead>(&self, stdin: R) -> Result<Vec<Dialog>> {
        match self {
            Self::File(path) => read_dialogs_from_file(path),
            Self::Stdin => read_dialogs(stdin),
        }
    }
}

/// Resolve dialogs from the prompt file or the process's standard input
pub fn resolve_dialogs(prompt_file: Option<&Path>) -> Result<Vec<Dialog>> {
    let stdin = std::io::stdin();
    let source = DialogSource::detect(prompt_file, stdin.is_terminal())?;
    tracing::debug!(?source, "Resolved dialog source");
    source.read_with(stdin.lock())
}

/// Read dialogs from a JSON prompt file
pub fn read_dialogs_from_file(path: impl AsRef<Path>) -> Result<Vec<Dialog>> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::input_parse(format!("Failed to read {}: {}", path.display(), e)))?;
    parse_dialogs(&contents)
}

/// Read dialogs from a line-oriented reader; lines are rejoined with `\n`
pub fn read_dialogs<R: BufRead>(reader: R) -> Result<Vec<Dialog>> {
    let lines = reader
        .lines()
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| Error::input_parse(format!("Failed to read input: {}", e)))?;
    parse_dialogs(&lines.join("\n"))
}

/// Parse a JSON array of dialogs
pub fn parse_dialogs(text: &str) -> Result<Vec<Dialog>> {
    let dialogs: Vec<Dialog> =
        serde_json::from_str(text).map_err(|e| Error::input_parse(e.to_string()))?;

    if dialogs.is_empty() {
        return Err(Error::input_parse("input contains no dialogs"));
    }

    if let Some(idx) = dialogs.iter().position(Dialog::is_empty) {
        return Err(Error::input_parse(format!("dialog {} has no turns", idx)));
    }

    Ok(dialogs)
}
