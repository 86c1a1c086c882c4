//! Core types for SafeChat

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single turn in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Role of the speaker (system, user, assistant)
    pub role: String,

    /// Text content of the turn
    pub content: String,
}

impl Turn {
    /// Create a new turn
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Create a user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// Create an assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }

    /// Create a system turn
    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }
}

/// An ordered multi-turn conversation.
///
/// Serialized as a bare JSON array of turns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dialog {
    turns: Vec<Turn>,
}

impl Dialog {
    /// Create a dialog from its turns
    pub fn new(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    /// All turns in order
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The first turn, screened as the user prompt
    pub fn first(&self) -> Option<&Turn> {
        self.turns.first()
    }

    /// Content of the first turn, or an empty string for an empty dialog
    pub fn prompt(&self) -> &str {
        self.first().map(|t| t.content.as_str()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

impl From<Vec<Turn>> for Dialog {
    fn from(turns: Vec<Turn>) -> Self {
        Self::new(turns)
    }
}

impl fmt::Display for Dialog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, turn) in self.turns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(
                f,
                "{{'role': {}, 'content': {}}}",
                quoted(&turn.role),
                quoted(&turn.content)
            )?;
        }
        write!(f, "]")
    }
}

/// Quote a string the way Python's `repr` does: single quotes unless the
/// text contains one and no double quote.
fn quoted(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_ascii_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialog_json_is_bare_array() {
        let dialog: Dialog =
            serde_json::from_str(r#"[{"role":"user","content":"hello"}]"#).unwrap();
        assert_eq!(dialog.len(), 1);
        assert_eq!(dialog.prompt(), "hello");
        assert_eq!(
            serde_json::to_string(&dialog).unwrap(),
            r#"[{"role":"user","content":"hello"}]"#
        );
    }

    #[test]
    fn test_prompt_is_first_turn() {
        let dialog = Dialog::new(vec![
            Turn::user("first"),
            Turn::assistant("reply"),
            Turn::user("second"),
        ]);
        assert_eq!(dialog.prompt(), "first");
    }

    #[test]
    fn test_display() {
        let dialog = Dialog::new(vec![Turn::user("hi")]);
        assert_eq!(dialog.to_string(), "[{'role': 'user', 'content': 'hi'}]");
    }

    #[test]
    fn test_display_quotes_like_repr() {
        let dialog = Dialog::new(vec![Turn::user("what's up?")]);
        assert_eq!(dialog.to_string(), r#"[{'role': 'user', 'content': "what's up?"}]"#);

        let dialog = Dialog::new(vec![Turn::user(r#"it's "quoted""#)]);
        assert_eq!(
            dialog.to_string(),
            r#"[{'role': 'user', 'content': 'it\'s "quoted"'}]"#
        );

        let dialog = Dialog::new(vec![Turn::user("line one\nline two\\")]);
        assert_eq!(
            dialog.to_string(),
            r#"[{'role': 'user', 'content': 'line one\nline two\\'}]"#
        );
    }
}
