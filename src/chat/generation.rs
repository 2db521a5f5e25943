//! Generation provider.
//!
//! Request and response bodies are explicit serde types; anything that does
//! not match them is reported as `GenerationError::Malformed`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Role, Turn};

pub const DEFAULT_GENERATION_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation provider returned status {status}")]
    Status { status: u16, body: String },

    #[error("generation request timed out after {0:?}")]
    Timeout(Duration),

    #[error("generation request failed: {0}")]
    Request(String),

    #[error("malformed generation response: {0}")]
    Malformed(String),

    #[error("generation response contained no text")]
    Empty,
}

impl GenerationError {
    /// Upstream HTTP status, when the provider answered at all.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            GenerationError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Capability that produces a reply from a system prompt and a conversation.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, system_prompt: &str, turns: &[Turn]) -> Result<String, GenerationError>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: 1024,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Model => "model",
    }
}

/// Concatenate every text part of every candidate.
fn extract_text(body: &str) -> Result<String, GenerationError> {
    let parsed: GenerateContentResponse =
        serde_json::from_str(body).map_err(|err| GenerationError::Malformed(err.to_string()))?;

    let text: String = parsed
        .candidates
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts)
        .filter_map(|part| part.text)
        .collect();

    if text.trim().is_empty() {
        return Err(GenerationError::Empty);
    }
    Ok(text)
}

pub struct GeminiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
    options: GenerationOptions,
}

impl GeminiGenerator {
    pub fn new(
        base_url: &str,
        api_key: String,
        model: &str,
        timeout: Duration,
        options: GenerationOptions,
    ) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| GenerationError::Request(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            timeout,
            options,
        })
    }

    async fn request(&self, system_prompt: &str, turns: &[Turn]) -> Result<String, GenerationError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let body = GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part { text: system_prompt }],
            },
            contents: turns
                .iter()
                .map(|turn| Content {
                    role: Some(role_name(turn.role)),
                    parts: vec![Part { text: &turn.text }],
                })
                .collect(),
            generation_config: GenerationConfig {
                temperature: self.options.temperature,
                max_output_tokens: self.options.max_output_tokens,
            },
        };

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    GenerationError::Timeout(self.timeout)
                } else {
                    GenerationError::Request(err.to_string())
                }
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|err| GenerationError::Request(err.to_string()))?;

        if !status.is_success() {
            log::error!("generation failed with {status}: {text}");
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        extract_text(&text)
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, system_prompt: &str, turns: &[Turn]) -> Result<String, GenerationError> {
        tokio::time::timeout(self.timeout, self.request(system_prompt, turns))
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout))?
    }

    fn name(&self) -> &str {
        &self.model
    }
}
