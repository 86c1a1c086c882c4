//! Chat templates mapping a dialog to model input text

use safechat_core::{Dialog, Turn};

/// Prompt format family of a chat model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatFormat {
    /// `<|start_header_id|>role<|end_header_id|>` headers (Llama 3.x)
    Llama3,
    /// `[INST] ... [/INST]` blocks with an optional `<<SYS>>` prefix (Llama 2)
    Llama2,
}

impl ChatFormat {
    /// Pick the format from the tokenizer's special tokens
    pub fn detect(tokenizer: &tokenizers::Tokenizer) -> Self {
        if tokenizer.token_to_id("<|start_header_id|>").is_some() {
            Self::Llama3
        } else {
            Self::Llama2
        }
    }

    /// Render a dialog into prompt text, special tokens included.
    ///
    /// With `add_generation_prompt` an open assistant header is appended
    /// (Llama 3 only; Llama 2 prompts already end in `[/INST]`).
    pub fn render(&self, dialog: &Dialog, add_generation_prompt: bool) -> String {
        match self {
            Self::Llama3 => render_llama3(dialog.turns(), add_generation_prompt),
            Self::Llama2 => render_llama2(dialog.turns()),
        }
    }

    /// Token strings that end an assistant turn
    pub fn stop_tokens(&self) -> &'static [&'static str] {
        match self {
            Self::Llama3 => &["<|eot_id|>", "<|end_of_text|>", "<|eom_id|>"],
            Self::Llama2 => &["</s>"],
        }
    }
}

fn render_llama3(turns: &[Turn], add_generation_prompt: bool) -> String {
    let mut prompt = String::from("<|begin_of_text|>");
    for turn in turns {
        prompt.push_str("<|start_header_id|>");
        prompt.push_str(&turn.role);
        prompt.push_str("<|end_header_id|>\n\n");
        prompt.push_str(turn.content.trim());
        prompt.push_str("<|eot_id|>");
    }
    if add_generation_prompt {
        prompt.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");
    }
    prompt
}

fn render_llama2(turns: &[Turn]) -> String {
    let (system, rest) = match turns.split_first() {
        Some((first, rest)) if first.role == "system" => (Some(first.content.trim()), rest),
        _ => (None, turns),
    };

    let mut prompt = String::new();
    let mut system = system;
    for turn in rest {
        if turn.role == "assistant" {
            prompt.push(' ');
            prompt.push_str(turn.content.trim());
            prompt.push_str(" </s>");
            continue;
        }

        prompt.push_str("<s>[INST] ");
        if let Some(sys) = system.take() {
            prompt.push_str("<<SYS>>\n");
            prompt.push_str(sys);
            prompt.push_str("\n<</SYS>>\n\n");
        }
        prompt.push_str(turn.content.trim());
        prompt.push_str(" [/INST]");
    }
    prompt
}
