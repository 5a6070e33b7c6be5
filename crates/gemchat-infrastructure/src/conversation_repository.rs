//! Conversation archive repository.
//!
//! Stores the archive as a versioned JSON document under the
//! `conversations` key. Unversioned documents from the browser client are
//! read as version 1.0.0 and migrated on load.

use async_trait::async_trait;
use version_migrate::Migrator;

use gemchat_core::conversation::{ConversationArchive, ConversationRepository};
use gemchat_core::{GemchatError, Result};

use crate::dto::{create_conversation_migrator, wrap_legacy_archive};
use crate::storage::JsonKeyValueStore;

pub struct FileConversationRepository {
    store: JsonKeyValueStore,
    migrator: Migrator,
}

impl FileConversationRepository {
    pub const KEY: &'static str = "conversations";

    pub fn new(store: JsonKeyValueStore) -> Self {
        Self {
            store,
            migrator: create_conversation_migrator(),
        }
    }
}

#[async_trait]
impl ConversationRepository for FileConversationRepository {
    async fn load(&self) -> Result<Option<ConversationArchive>> {
        let store = self.store.clone();
        let value = tokio::task::spawn_blocking(move || store.get(Self::KEY))
            .await
            .map_err(|e| GemchatError::internal(format!("Storage task failed: {}", e)))??;

        let Some(value) = value else {
            return Ok(None);
        };

        let archive: ConversationArchive = self
            .migrator
            .load_flat_from(Self::KEY, wrap_legacy_archive(value))
            .map_err(|e| GemchatError::Migration(format!("Failed to migrate conversations: {}", e)))?;

        tracing::debug!(
            "[FileConversationRepository] Loaded {} conversation(s)",
            archive.conversations.len()
        );
        Ok(Some(archive))
    }

    async fn save(&self, archive: &ConversationArchive) -> Result<()> {
        let serialized = self
            .migrator
            .save_domain_flat(Self::KEY, archive.clone())
            .map_err(|e| GemchatError::Migration(format!("Failed to serialize conversations: {}", e)))?;

        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.put(Self::KEY, &serialized))
            .await
            .map_err(|e| GemchatError::internal(format!("Storage task failed: {}", e)))??;

        Ok(())
    }
}
