//! Model client that turns a question into raw SQL text.
//!
//! The output is untrusted: it goes through the gate like any other text.

use crate::error::{ExplorerError, Result};
use crate::gate::RawModelOutput;
use crate::schema::SchemaDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const SYSTEM_RULES: &str = "You are a senior data analyst that writes safe, syntactically-correct SQLite SELECT queries.
- Use only SELECT queries.
- Do not use multiple statements; return exactly one SQL statement.
- Prefer correct table and column names based on the schema provided.
- If aggregation is requested, include GROUP BY as needed.
- Output SQL only, no prose.";

/// Anything that can produce SQL text for a question.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate(&self, question: &str, schema: &SchemaDescriptor) -> Result<RawModelOutput>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: 0.2,
            max_tokens: 300,
            request_timeout_secs: 60,
        }
    }
}

pub struct LlmClient {
    settings: LlmSettings,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(settings: LlmSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| ExplorerError::Llm(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { settings, http })
    }

    async fn call_llm(&self, prompt: &str) -> Result<String> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ExplorerError::Llm("OPENAI_API_KEY is not set".to_string()))?;

        let body = serde_json::json!({
            "model": self.settings.model,
            "messages": [
                {"role": "system", "content": SYSTEM_RULES},
                {"role": "user", "content": prompt}
            ],
            "temperature": self.settings.temperature,
            "max_tokens": self.settings.max_tokens
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/')))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExplorerError::Llm(format!("LLM API call failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExplorerError::Llm(format!("LLM API returned {}", status)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ExplorerError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        response_json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ExplorerError::Llm("No content in LLM response".to_string()))
    }
}

#[async_trait]
impl SqlGenerator for LlmClient {
    async fn generate(&self, question: &str, schema: &SchemaDescriptor) -> Result<RawModelOutput> {
        let prompt = build_prompt(question, schema);
        debug!(model = %self.settings.model, "requesting SQL from model");
        self.call_llm(&prompt).await.map(RawModelOutput::from)
    }
}

pub fn build_prompt(question: &str, schema: &SchemaDescriptor) -> String {
    format!(
        "Schema:\n{}\n\nUser question:\n\"\"\"{}\"\"\"\nReturn only SQL.",
        schema.to_prompt_text(),
        question
    )
}
