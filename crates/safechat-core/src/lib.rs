//! SafeChat Core
//!
//! Core types and utilities shared across SafeChat components.
//!
//! This crate provides:
//! - Conversation types (`Turn`, `Dialog`)
//! - Dialog input resolution from a prompt file or standard input
//! - Error types and result handling

pub mod dialog;
pub mod error;
pub mod types;

pub use dialog::{parse_dialogs, read_dialogs, read_dialogs_from_file, resolve_dialogs, DialogSource};
pub use error::{Error, Result};
pub use types::{Dialog, Turn};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::dialog::DialogSource;
    pub use crate::error::{Error, Result};
    pub use crate::types::{Dialog, Turn};
}
