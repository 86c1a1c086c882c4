//! SafeChat CLI
//!
//! Library side of the `chat-completion` binary: argument parsing, run
//! configuration and the guarded generation driver.

pub mod app;
pub mod cli;
pub mod config;
pub mod driver;

pub use app::{run, Backend, CandleBackend};
pub use cli::Cli;
pub use config::RunConfig;
pub use driver::{run_dialogs, RunSummary};
