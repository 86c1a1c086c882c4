//! Azure AI Content Safety checker
//!
//! Calls the hosted `text:analyze` endpoint and deems text safe only when
//! every harm category comes back at severity 0.

use crate::checker::{pipe_table, SafetyChecker, SafetyResult};
use safechat_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Environment variable holding the subscription key
pub const KEY_ENV: &str = "CONTENT_SAFETY_KEY";
/// Environment variable holding the resource endpoint
pub const ENDPOINT_ENV: &str = "CONTENT_SAFETY_ENDPOINT";

const API_VERSION: &str = "2023-10-01";
const MAX_TEXT_CHARS: usize = 1000;

/// Harm categories requested from the service, in report order
const CATEGORIES: &[(&str, &str)] = &[
    ("Violence", "VIOLENCE"),
    ("SelfHarm", "SELF_HARM"),
    ("Sexual", "SEXUAL"),
    ("Hate", "HATE"),
];

/// Highest severity still considered safe, per category
const MAX_SAFE_SEVERITY: u8 = 0;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeTextRequest<'a> {
    text: &'a str,
    categories: Vec<&'static str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeTextResponse {
    #[serde(default)]
    categories_analysis: Vec<CategoryAnalysis>,
}

#[derive(Debug, Deserialize)]
struct CategoryAnalysis {
    category: String,
    #[serde(default)]
    severity: u8,
}

/// Content-safety checker backed by the Azure AI Content Safety API
pub struct AzureContentSafetyChecker {
    name: String,
    client: reqwest::Client,
    endpoint: String,
    key: String,
}

impl AzureContentSafetyChecker {
    /// Create a checker for an explicit endpoint and key
    pub fn new(endpoint: impl Into<String>, key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::checker(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            name: "Azure Content Saftey API".to_string(),
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            key: key.into(),
        })
    }

    /// Create a checker from `CONTENT_SAFETY_ENDPOINT` and `CONTENT_SAFETY_KEY`
    pub fn from_env() -> Result<Self> {
        let key = std::env::var(KEY_ENV)
            .map_err(|_| Error::config(format!("Could not get {} from environment", KEY_ENV)))?;
        let endpoint = std::env::var(ENDPOINT_ENV).map_err(|_| {
            Error::config(format!("Could not get {} from environment", ENDPOINT_ENV))
        })?;
        Self::new(endpoint, key)
    }

    fn analyze_url(&self) -> String {
        format!(
            "{}/contentsafety/text:analyze?api-version={}",
            self.endpoint, API_VERSION
        )
    }
}

/// Name of a severity level as reported by the service
pub fn severity_level(severity: u8) -> &'static str {
    match severity {
        0 | 1 => "Safe",
        2 | 3 => "Low",
        4 | 5 => "Medium",
        _ => "High",
    }
}

/// Order severities by [`CATEGORIES`]; categories missing from the response count as 0
fn severities(response: &AnalyzeTextResponse) -> Vec<u8> {
    CATEGORIES
        .iter()
        .map(|(api_name, _)| {
            response
                .categories_analysis
                .iter()
                .find(|c| c.category == *api_name)
                .map(|c| c.severity)
                .unwrap_or(0)
        })
        .collect()
}

fn verdict(name: &str, severities: &[u8]) -> SafetyResult {
    if severities.iter().all(|&s| s <= MAX_SAFE_SEVERITY) {
        return SafetyResult::safe(name);
    }

    let headers: Vec<&str> = CATEGORIES.iter().map(|(_, display)| *display).collect();
    let levels: Vec<&str> = severities.iter().map(|&s| severity_level(s)).collect();
    SafetyResult::unsafe_with(name, pipe_table(&headers, &levels))
}

#[async_trait::async_trait]
impl SafetyChecker for AzureContentSafetyChecker {
    async fn evaluate(&self, text: &str) -> Result<SafetyResult> {
        let start = Instant::now();

        if text.chars().count() > MAX_TEXT_CHARS {
            return Err(Error::checker(format!(
                "Input length to safety check is too long (>{}).",
                MAX_TEXT_CHARS
            )));
        }

        let request = AnalyzeTextRequest {
            text,
            categories: CATEGORIES.iter().map(|(api_name, _)| *api_name).collect(),
        };

        let response = self
            .client
            .post(self.analyze_url())
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::checker(format!("Content safety request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Analyze text failed: {} {}", status, body);
            return Err(Error::checker(format!(
                "Content safety API returned {}: {}",
                status, body
            )));
        }

        let analysis: AnalyzeTextResponse = response
            .json()
            .await
            .map_err(|e| Error::checker(format!("Invalid content safety response: {}", e)))?;

        Ok(verdict(&self.name, &severities(&analysis))
            .with_latency_us(start.elapsed().as_micros() as u64))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
