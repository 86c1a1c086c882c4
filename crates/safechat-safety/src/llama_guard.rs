//! Llama Guard 3 safety checker
//!
//! Runs a Llama Guard model through the causal-LM runtime. The text under
//! test is wrapped in the guard prompt with the S1-S14 hazard taxonomy; the
//! model answers `safe`, or `unsafe` followed by the violated codes.
//!
//! HF: meta-llama/Llama-Guard-3-1B (gated)

use crate::checker::{SafetyChecker, SafetyResult};
use regex::Regex;
use safechat_core::{Error, Result};
use safechat_runtime::{CausalLmRuntime, ChatModel, GenerationContext, GenerationRequest, ModelSettings, SamplingParams};
use std::sync::Mutex;
use std::time::Instant;

/// Default guard model on the Hub
pub const DEFAULT_MODEL: &str = "meta-llama/Llama-Guard-3-1B";

/// Report of an agent check without the prompt that produced the response
pub const MISSING_USER_PROMPT: &str = "Missing user_prompt from Agent response check";

const MAX_NEW_TOKENS: usize = 100;

/// Hazard taxonomy (S1-S14)
const CATEGORIES: &[(&str, &str)] = &[
    ("S1", "Violent Crimes"),
    ("S2", "Non-Violent Crimes"),
    ("S3", "Sex Crimes"),
    ("S4", "Child Exploitation"),
    ("S5", "Defamation"),
    ("S6", "Specialized Advice"),
    ("S7", "Privacy"),
    ("S8", "Intellectual Property"),
    ("S9", "Indiscriminate Weapons"),
    ("S10", "Hate"),
    ("S11", "Self-Harm"),
    ("S12", "Sexual Content"),
    ("S13", "Elections"),
    ("S14", "Code Interpreter Abuse"),
];

/// Whose message is being assessed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentType {
    User,
    Agent,
}

impl AgentType {
    fn as_str(&self) -> &'static str {
        match self {
            AgentType::User => "User",
            AgentType::Agent => "Agent",
        }
    }
}

/// Build the guard prompt for a conversation ending with a message from `agent_type`
pub fn build_prompt(agent_type: AgentType, conversation: &[(AgentType, &str)]) -> String {
    let role = agent_type.as_str();
    let mut prompt = String::new();

    prompt.push_str("<|begin_of_text|><|start_header_id|>user<|end_header_id|>\n\n");
    prompt.push_str(&format!(
        "Task: Check if there is unsafe content in '{}' messages in conversations according our safety policy with the below categories.\n\n",
        role
    ));
    prompt.push_str("<BEGIN UNSAFE CONTENT CATEGORIES>\n");
    for (code, desc) in CATEGORIES {
        prompt.push_str(&format!("{}: {}.\n", code, desc));
    }
    prompt.push_str("<END UNSAFE CONTENT CATEGORIES>\n\n");

    prompt.push_str("<BEGIN CONVERSATION>\n\n");
    for (speaker, content) in conversation {
        prompt.push_str(&format!("{}: {}\n\n", speaker.as_str(), content.trim()));
    }
    prompt.push_str("<END CONVERSATION>\n\n");

    prompt.push_str(&format!(
        "Provide your safety assessment for ONLY THE LAST {} message in the above conversation:\n",
        role
    ));
    prompt.push_str(" - First line must read 'safe' or 'unsafe'.\n");
    prompt.push_str(" - If unsafe, a second line must include a comma-separated list of violated categories.");
    prompt.push_str("<|eot_id|><|start_header_id|>assistant<|end_header_id|>\n\n");

    prompt
}

/// Extracts hazard codes from the second line of the guard output
pub struct CategoryParser {
    code_regex: Regex,
}

impl CategoryParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            code_regex: Regex::new(r"\bS(1[0-4]|[1-9])\b")
                .map_err(|e| Error::checker(format!("Failed to compile category regex: {}", e)))?,
        })
    }

    /// Hazard categories named in the guard output, as `(code, description)`
    pub fn violated_categories(&self, output: &str) -> Vec<(&'static str, &'static str)> {
        let Some(codes_line) = output.trim().lines().nth(1) else {
            return Vec::new();
        };

        let mut found = Vec::new();
        for mat in self.code_regex.find_iter(codes_line) {
            if let Some(entry) = CATEGORIES.iter().find(|(code, _)| *code == mat.as_str()) {
                if !found.contains(entry) {
                    found.push(*entry);
                }
            }
        }
        found
    }
}

/// Safe iff the first line of the guard output is exactly `safe`
fn verdict(name: &str, output: &str) -> SafetyResult {
    let first_line = output.trim_start().split('\n').next().unwrap_or_default();
    if first_line.trim_end() == "safe" {
        SafetyResult::safe(name)
    } else {
        SafetyResult::unsafe_with(name, output)
    }
}

/// Guard prompt for an agent response, or the verdict when it cannot be built.
///
/// Decoded generations echo the prompt, so every occurrence of the user
/// prompt is removed from the response before it is assessed.
fn agent_prompt(name: &str, user_prompt: &str, response: &str) -> std::result::Result<String, SafetyResult> {
    if user_prompt.trim().is_empty() {
        return Err(SafetyResult::unsafe_with(name, MISSING_USER_PROMPT));
    }
    let response = response.replace(user_prompt, "");
    Ok(build_prompt(
        AgentType::Agent,
        &[(AgentType::User, user_prompt), (AgentType::Agent, &response)],
    ))
}

/// Safety checker backed by a Llama Guard model
pub struct LlamaGuardChecker {
    name: String,
    runtime: Mutex<CausalLmRuntime>,
    parser: CategoryParser,
}

impl LlamaGuardChecker {
    /// Load the guard model
    pub fn load(model_id: &str, cpu: bool) -> Result<Self> {
        let settings = ModelSettings {
            cpu,
            ..ModelSettings::new(model_id)
        };
        let runtime = CausalLmRuntime::load(&settings)?;
        Ok(Self {
            name: "Llama Guard 3".to_string(),
            runtime: Mutex::new(runtime),
            parser: CategoryParser::new()?,
        })
    }

    /// Assess an agent response in the context of the prompt that produced it
    pub async fn evaluate_agent(&self, user_prompt: &str, response: &str) -> Result<SafetyResult> {
        match agent_prompt(&self.name, user_prompt, response) {
            Ok(prompt) => self.run(&prompt),
            Err(result) => Ok(result),
        }
    }

    fn run(&self, prompt: &str) -> Result<SafetyResult> {
        let start = Instant::now();
        let mut runtime = self
            .runtime
            .lock()
            .map_err(|_| Error::internal("Llama Guard runtime lock poisoned"))?;

        let input_ids = runtime.encode(prompt)?;
        let prompt_len = input_ids.len();

        let mut ctx = GenerationContext::new(0, SamplingParams::greedy(MAX_NEW_TOKENS));
        let output = runtime.generate(&GenerationRequest::new(input_ids), &mut ctx)?;
        let text = runtime.decode(&output[prompt_len..])?;

        let categories = self.parser.violated_categories(&text);
        tracing::debug!(output = %text.trim(), ?categories, "Llama Guard assessment");

        Ok(verdict(&self.name, &text).with_latency_us(start.elapsed().as_micros() as u64))
    }
}

#[async_trait::async_trait]
impl SafetyChecker for LlamaGuardChecker {
    async fn evaluate(&self, text: &str) -> Result<SafetyResult> {
        let prompt = build_prompt(AgentType::User, &[(AgentType::User, text)]);
        self.run(&prompt)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_prompt_lists_taxonomy() {
        let prompt = build_prompt(AgentType::User, &[(AgentType::User, "How do I bake bread?")]);
        assert!(prompt.starts_with("<|begin_of_text|><|start_header_id|>user<|end_header_id|>"));
        assert!(prompt.contains("unsafe content in 'User' messages"));
        assert!(prompt.contains("S1: Violent Crimes.\n"));
        assert!(prompt.contains("S14: Code Interpreter Abuse.\n"));
        assert!(prompt.contains("User: How do I bake bread?\n\n<END CONVERSATION>"));
        assert!(prompt.contains("ONLY THE LAST User message"));
        assert!(prompt.ends_with("<|start_header_id|>assistant<|end_header_id|>\n\n"));
    }

    #[test]
    fn test_agent_prompt_includes_both_turns() {
        let prompt = build_prompt(
            AgentType::Agent,
            &[(AgentType::User, "hi"), (AgentType::Agent, "hello there")],
        );
        assert!(prompt.contains("User: hi\n\nAgent: hello there\n\n"));
        assert!(prompt.contains("ONLY THE LAST Agent message"));
    }

    #[test]
    fn test_agent_prompt_strips_echoed_user_prompt() {
        let prompt = agent_prompt(
            "guard",
            "Tell me a joke",
            "Tell me a joke Why did the chicken cross the road?",
        )
        .unwrap();
        assert!(prompt.contains("User: Tell me a joke\n\nAgent: Why did the chicken cross the road?\n\n"));
        assert!(prompt.contains("ONLY THE LAST Agent message"));
    }

    #[test]
    fn test_agent_prompt_without_user_prompt_is_unsafe() {
        let result = agent_prompt("guard", "", "some response").unwrap_err();
        assert!(!result.is_safe);
        assert_eq!(result.checker, "guard");
        assert_eq!(result.report, MISSING_USER_PROMPT);

        assert!(agent_prompt("guard", "  \n", "some response").is_err());
    }

    #[test]
    fn test_safe_output() {
        assert!(verdict("guard", "safe").is_safe);
        assert!(verdict("guard", "\n\nsafe").is_safe);
        assert!(verdict("guard", "safe\n").is_safe);
    }

    #[test]
    fn test_unsafe_output_reports_full_text() {
        let result = verdict("guard", "unsafe\nS1,S10");
        assert!(!result.is_safe);
        assert_eq!(result.report, "unsafe\nS1,S10");
    }

    #[test]
    fn test_first_line_must_be_exactly_safe() {
        assert!(!verdict("guard", "safety first").is_safe);
        assert!(!verdict("guard", "").is_safe);
    }

    #[test]
    fn test_violated_categories() {
        let parser = CategoryParser::new().unwrap();
        let found = parser.violated_categories("unsafe\nS1, S10,S1");
        assert_eq!(found, vec![("S1", "Violent Crimes"), ("S10", "Hate")]);
        assert!(parser.violated_categories("safe").is_empty());
        assert!(parser.violated_categories("unsafe\nS15").is_empty());
    }
}
