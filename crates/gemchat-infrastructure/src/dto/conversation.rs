//! Conversation archive DTOs and migrations
//!
//! ## Version History
//! - **1.0.0**: Layout written by the browser client. Per-conversation
//!   `generationConfig` may be missing or partial, `model` may be missing,
//!   images are opaque values, the assistant sender is called `gemini`.
//! - **1.1.0**: `generationConfig` complete, images are `{path, mimeType}`,
//!   adds `activeId`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use version_migrate::{FromDomain, IntoDomain, MigratesTo, Versioned};

use gemchat_core::conversation::{
    Conversation, ConversationArchive, GenerationConfig, ImageAttachment, Message, Sender,
};

/// Version written for documents that carry no version marker.
pub const LEGACY_ARCHIVE_VERSION: &str = "1.0.0";

// ============================================================================
// Shared pieces
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderDTO {
    User,
    #[serde(alias = "gemini", alias = "model")]
    Assistant,
}

impl From<SenderDTO> for Sender {
    fn from(dto: SenderDTO) -> Self {
        match dto {
            SenderDTO::User => Sender::User,
            SenderDTO::Assistant => Sender::Assistant,
        }
    }
}

impl From<Sender> for SenderDTO {
    fn from(sender: Sender) -> Self {
        match sender {
            Sender::User => SenderDTO::User,
            Sender::Assistant => SenderDTO::Assistant,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAttachmentDTO {
    pub path: String,
    pub mime_type: String,
}

// ============================================================================
// V1.0.0
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageV1_0_0 {
    pub sender: SenderDTO,
    #[serde(default)]
    pub content: String,
    /// Whatever the writer stored: a blob URL, an object, or null.
    #[serde(default)]
    pub image: Option<JsonValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfigV1_0_0 {
    #[serde(default)]
    pub candidate_count: Option<u32>,
    #[serde(default)]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationV1_0_0 {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub history: Vec<MessageV1_0_0>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub generation_config: Option<GenerationConfigV1_0_0>,
}

/// Conversation archive DTO V1.0.0
#[derive(Debug, Clone, Serialize, Deserialize, Versioned)]
#[versioned(version = "1.0.0")]
pub struct ConversationArchiveV1_0_0 {
    #[serde(default)]
    pub conversations: BTreeMap<String, ConversationV1_0_0>,
}

// ============================================================================
// V1.1.0
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageV1_1_0 {
    pub sender: SenderDTO,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageAttachmentDTO>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfigV1_1_0 {
    pub candidate_count: u32,
    pub stop_sequences: Vec<String>,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationV1_1_0 {
    pub id: String,
    pub name: String,
    pub history: Vec<MessageV1_1_0>,
    pub model: String,
    pub generation_config: GenerationConfigV1_1_0,
}

/// Conversation archive DTO V1.1.0
#[derive(Debug, Clone, Serialize, Deserialize, Versioned)]
#[versioned(version = "1.1.0")]
#[serde(rename_all = "camelCase")]
pub struct ConversationArchiveV1_1_0 {
    pub conversations: BTreeMap<String, ConversationV1_1_0>,
    #[serde(default)]
    pub active_id: Option<String>,
}

// ============================================================================
// Migration implementations
// ============================================================================

/// Back-fills generation settings, normalizes images and keys ids by map key.
impl MigratesTo<ConversationArchiveV1_1_0> for ConversationArchiveV1_0_0 {
    fn migrate(self) -> ConversationArchiveV1_1_0 {
        let conversations = self
            .conversations
            .into_iter()
            .map(|(key, legacy)| {
                let migrated = migrate_conversation(&key, legacy);
                (key, migrated)
            })
            .collect();

        ConversationArchiveV1_1_0 {
            conversations,
            active_id: None,
        }
    }
}

fn migrate_conversation(key: &str, legacy: ConversationV1_0_0) -> ConversationV1_1_0 {
    let defaults = GenerationConfig::default();
    let legacy_config = legacy.generation_config.unwrap_or_default();
    let name = if legacy.name.trim().is_empty() {
        key.to_string()
    } else {
        legacy.name
    };

    ConversationV1_1_0 {
        id: key.to_string(),
        name,
        history: legacy
            .history
            .into_iter()
            .map(|m| MessageV1_1_0 {
                sender: m.sender,
                content: m.content,
                image: m.image.and_then(migrate_image),
            })
            .collect(),
        model: legacy.model.unwrap_or_default(),
        generation_config: GenerationConfigV1_1_0 {
            candidate_count: legacy_config
                .candidate_count
                .unwrap_or(defaults.candidate_count),
            stop_sequences: legacy_config
                .stop_sequences
                .unwrap_or(defaults.stop_sequences),
            max_output_tokens: legacy_config
                .max_output_tokens
                .unwrap_or(defaults.max_output_tokens),
            temperature: legacy_config.temperature.unwrap_or(defaults.temperature),
        },
    }
}

/// Only `{path, mimeType}` objects survive. Blob URLs die with the page
/// that created them.
fn migrate_image(value: JsonValue) -> Option<ImageAttachmentDTO> {
    serde_json::from_value(value).ok()
}

// ============================================================================
// Domain model conversions
// ============================================================================

impl From<GenerationConfigV1_1_0> for GenerationConfig {
    fn from(dto: GenerationConfigV1_1_0) -> Self {
        GenerationConfig {
            candidate_count: dto.candidate_count,
            stop_sequences: dto.stop_sequences,
            max_output_tokens: dto.max_output_tokens,
            temperature: dto.temperature,
        }
    }
}

impl From<&GenerationConfig> for GenerationConfigV1_1_0 {
    fn from(config: &GenerationConfig) -> Self {
        GenerationConfigV1_1_0 {
            candidate_count: config.candidate_count,
            stop_sequences: config.stop_sequences.clone(),
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
        }
    }
}

impl From<MessageV1_1_0> for Message {
    fn from(dto: MessageV1_1_0) -> Self {
        Message {
            sender: dto.sender.into(),
            content: dto.content,
            image: dto
                .image
                .map(|img| ImageAttachment::new(img.path, img.mime_type)),
        }
    }
}

impl From<&Message> for MessageV1_1_0 {
    fn from(message: &Message) -> Self {
        MessageV1_1_0 {
            sender: message.sender.into(),
            content: message.content.clone(),
            image: message.image.as_ref().map(|img| ImageAttachmentDTO {
                path: img.path.clone(),
                mime_type: img.mime_type.clone(),
            }),
        }
    }
}

impl From<ConversationV1_1_0> for Conversation {
    fn from(dto: ConversationV1_1_0) -> Self {
        Conversation {
            id: dto.id,
            name: dto.name,
            history: dto.history.into_iter().map(Message::from).collect(),
            model: dto.model,
            generation_config: dto.generation_config.into(),
        }
    }
}

impl From<&Conversation> for ConversationV1_1_0 {
    fn from(conversation: &Conversation) -> Self {
        ConversationV1_1_0 {
            id: conversation.id.clone(),
            name: conversation.name.clone(),
            history: conversation.history.iter().map(MessageV1_1_0::from).collect(),
            model: conversation.model.clone(),
            generation_config: (&conversation.generation_config).into(),
        }
    }
}

impl IntoDomain<ConversationArchive> for ConversationArchiveV1_1_0 {
    fn into_domain(self) -> ConversationArchive {
        ConversationArchive {
            conversations: self
                .conversations
                .into_iter()
                .map(|(key, dto)| (key, dto.into()))
                .collect(),
            active_id: self.active_id,
        }
    }
}

impl FromDomain<ConversationArchive> for ConversationArchiveV1_1_0 {
    fn from_domain(archive: ConversationArchive) -> Self {
        ConversationArchiveV1_1_0 {
            conversations: archive
                .conversations
                .iter()
                .map(|(key, conversation)| (key.clone(), conversation.into()))
                .collect(),
            active_id: archive.active_id,
        }
    }
}

// ============================================================================
// Migrator factory
// ============================================================================

/// Creates a Migrator for the conversation archive.
///
/// # Migration Path
///
/// - 1.0.0 → 1.1.0: back-fills generation settings and drops stale images
/// - 1.1.0 → ConversationArchive
pub fn create_conversation_migrator() -> version_migrate::Migrator {
    version_migrate::migrator!("conversations" => [
        ConversationArchiveV1_0_0,
        ConversationArchiveV1_1_0,
        ConversationArchive
    ], save = true)
    .expect("Failed to create conversations migrator")
}

/// Wraps a bare `{id: conversation}` map in a 1.0.0 envelope.
///
/// Versioned documents are returned unchanged.
pub fn wrap_legacy_archive(value: JsonValue) -> JsonValue {
    if value.get("version").is_some() {
        return value;
    }
    serde_json::json!({
        "version": LEGACY_ARCHIVE_VERSION,
        "conversations": value,
    })
}
