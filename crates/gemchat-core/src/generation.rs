//! Interface to the remote text-generation service.
//!
//! The core only knows the two call shapes it needs: a multi-turn chat over
//! the conversation history, and a one-shot prompt made of text and inline
//! image parts. Transport, authentication and wire format live behind
//! [`GenerationBackend`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conversation::{GenerationConfig, Message, Sender};

/// Role of a turn as the remote API understands it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

impl From<Sender> for TurnRole {
    fn from(sender: Sender) -> Self {
        match sender {
            Sender::User => TurnRole::User,
            Sender::Assistant => TurnRole::Model,
        }
    }
}

/// One text turn of a chat request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub text: String,
}

impl ChatTurn {
    pub fn new(role: TurnRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    /// Maps a history to chat turns, dropping messages with empty content.
    pub fn from_history(history: &[Message]) -> Vec<ChatTurn> {
        history
            .iter()
            .filter(|m| !m.content.is_empty())
            .map(|m| ChatTurn::new(m.sender.into(), m.content.clone()))
            .collect()
    }
}

/// Image bytes ready to be sent inline: base64 payload plus MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

/// One part of a one-shot multimodal prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptPart {
    Text(String),
    Image(InlineImage),
}

/// Failure of a remote generation call.
///
/// Callers turn these into conversation content instead of propagating them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteCallError {
    #[error("Gemini API not initialized. Please set API key and model first.")]
    NotConfigured,

    #[error("HTTP {status}: {message}{}", retry_hint(.retry_after_secs))]
    Http {
        status: u16,
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("response contained no text")]
    EmptyResponse,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("could not read image: {0}")]
    Image(String),
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(" (retry after {secs}s)"),
        None => String::new(),
    }
}

/// A connected generation service bound to one model.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Multi-turn chat. The last turn is the new user prompt.
    async fn chat(
        &self,
        turns: &[ChatTurn],
        config: &GenerationConfig,
    ) -> Result<String, RemoteCallError>;

    /// One-shot prompt made of text and inline image parts.
    async fn generate(
        &self,
        parts: &[PromptPart],
        config: &GenerationConfig,
    ) -> Result<String, RemoteCallError>;
}
