//! Conversation and generation settings.

use serde::{Deserialize, Serialize};

use super::message::Message;

/// Sampling settings sent with every request for a conversation.
///
/// `candidate_count` and `stop_sequences` are fixed; only the token budget
/// and temperature are user-editable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub candidate_count: u32,
    pub stop_sequences: Vec<String>,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl GenerationConfig {
    pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2048;
    pub const DEFAULT_TEMPERATURE: f32 = 1.0;

    /// Copy with the fixed fields reset, as it is put on the wire.
    pub fn for_request(&self) -> Self {
        Self {
            candidate_count: 1,
            stop_sequences: Vec::new(),
            max_output_tokens: self.max_output_tokens,
            temperature: self.temperature,
        }
    }

    pub fn apply(&mut self, setting: GenerationSetting) {
        match setting {
            GenerationSetting::MaxOutputTokens(tokens) => self.max_output_tokens = tokens,
            GenerationSetting::Temperature(temperature) => self.temperature = temperature,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            candidate_count: 1,
            stop_sequences: Vec::new(),
            max_output_tokens: Self::DEFAULT_MAX_OUTPUT_TOKENS,
            temperature: Self::DEFAULT_TEMPERATURE,
        }
    }
}

/// One user-editable field of [`GenerationConfig`].
///
/// Values are stored as given; range checks are left to the remote API.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GenerationSetting {
    MaxOutputTokens(u32),
    Temperature(f32),
}

/// A named chat thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub name: String,
    pub history: Vec<Message>,
    /// Model bound to this thread. Rebound to the configured model on load.
    pub model: String,
    pub generation_config: GenerationConfig,
}

impl Conversation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            history: Vec::new(),
            model: model.into(),
            generation_config: GenerationConfig::default(),
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.history.last()
    }
}
