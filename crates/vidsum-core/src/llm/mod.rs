//! A single synchronous chat-completion call against a remote LLM endpoint,
//! with the controlled retry policy from spec.md §4.5.

pub mod http;

use async_trait::async_trait;
use std::time::Duration;

use crate::config::ModelTier;
use crate::error::LlmError;

/// Role of a participant in a chat message, mirroring
/// `querymt::chat::ChatRole` but trimmed to what the cascade needs (no
/// multi-modal content, no tool calls — the orchestrator only ever sends
/// plain text prompts to the chat endpoint).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Performs a single chat completion, with retries on transient failures
/// handled internally (spec.md §4.5).
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// `api_key`, when `None`, falls back to whatever shared configuration
    /// the concrete implementation was constructed with.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tier: ModelTier,
        top_p: f32,
        timeout: Duration,
        api_key: Option<&str>,
    ) -> Result<String, LlmError>;
}
