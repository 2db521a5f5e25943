//! Chat orchestration: validate, retrieve, prompt, generate.

pub mod generation;
pub mod orchestrator;
pub mod prompt;

use serde::{Deserialize, Serialize};

pub use generation::{GeminiGenerator, GenerationError, GenerationOptions, Generator};
pub use orchestrator::{ChatDebug, ChatReply, ChatService, ChatSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ChatError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("service is not configured: {0}")]
    Configuration(String),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("unexpected error: {0:?}")]
    Internal(#[from] anyhow::Error),
}
