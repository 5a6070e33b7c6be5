use std::collections::BTreeMap;
use std::sync::Arc;

use super::message::Message;
use super::model::{Conversation, GenerationSetting};
use super::repository::{ConversationArchive, ConversationRepository};
use crate::error::{GemchatError, Result};

const ID_PREFIX: &str = "chat-";

/// In-memory set of conversations backed by a [`ConversationRepository`].
///
/// Invariants:
/// - the mapping is never empty once the store is loaded
/// - `active_id` always names an existing conversation
/// - every conversation is bound to the configured model
///
/// Every mutation writes the full archive through to the repository. A
/// failed write-through is logged and the in-memory change is kept.
pub struct ConversationStore {
    conversations: BTreeMap<String, Conversation>,
    active_id: String,
    configured_model: String,
    repository: Arc<dyn ConversationRepository>,
    /// Millisecond component of the newest id, so new ids keep increasing.
    last_id_millis: i64,
}

impl ConversationStore {
    /// Loads the persisted archive for `configured_model`.
    ///
    /// An absent, empty or unreadable archive yields a single fresh
    /// conversation named "New Chat 1". Loaded conversations are rebound
    /// to `configured_model`.
    pub async fn load(
        repository: Arc<dyn ConversationRepository>,
        configured_model: impl Into<String>,
    ) -> Self {
        let configured_model = configured_model.into();

        let archive = match repository.load().await {
            Ok(Some(archive)) => archive,
            Ok(None) => ConversationArchive::default(),
            Err(e) => {
                tracing::warn!(
                    "[ConversationStore] Stored conversations unreadable, starting fresh: {}",
                    e
                );
                ConversationArchive::default()
            }
        };

        let mut conversations = archive.conversations;
        for conversation in conversations.values_mut() {
            conversation.model = configured_model.clone();
        }
        let last_id_millis = conversations
            .keys()
            .filter_map(|id| parse_id_millis(id))
            .max()
            .unwrap_or(0);

        let mut store = Self {
            conversations,
            active_id: String::new(),
            configured_model,
            repository,
            last_id_millis,
        };

        if store.conversations.is_empty() {
            let id = store.next_id();
            let conversation = Conversation::new(&id, "New Chat 1", &store.configured_model);
            store.conversations.insert(id.clone(), conversation);
            store.active_id = id;
            tracing::info!("[ConversationStore] No stored conversations, created '{}'", store.active_id);
            store.write_through().await;
        } else {
            store.active_id = match archive.active_id {
                Some(id) if store.conversations.contains_key(&id) => id,
                _ => store.first_id(),
            };
            tracing::debug!(
                "[ConversationStore] Loaded {} conversation(s), active '{}'",
                store.conversations.len(),
                store.active_id
            );
        }

        store
    }

    pub fn configured_model(&self) -> &str {
        &self.configured_model
    }

    pub fn active_id(&self) -> &str {
        &self.active_id
    }

    pub fn active(&self) -> Option<&Conversation> {
        self.conversations.get(&self.active_id)
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    /// Conversations in id order, which is creation order for generated ids.
    pub fn conversations(&self) -> impl Iterator<Item = &Conversation> {
        self.conversations.values()
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// Creates a conversation and returns its id. The active selection is unchanged.
    pub async fn create(&mut self, name: Option<String>) -> String {
        let id = self.next_id();
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("New Chat {}", self.conversations.len() + 1));

        let conversation = Conversation::new(&id, name, &self.configured_model);
        self.conversations.insert(id.clone(), conversation);
        tracing::debug!("[ConversationStore] Created conversation '{}'", id);

        self.write_through().await;
        id
    }

    /// Deletes a conversation. The last remaining one cannot be deleted.
    ///
    /// When the active conversation is deleted, the first remaining one
    /// becomes active.
    pub async fn delete(&mut self, id: &str) -> Result<()> {
        if !self.conversations.contains_key(id) {
            return Err(GemchatError::not_found("conversation", id));
        }
        if self.conversations.len() == 1 {
            return Err(GemchatError::invariant(
                "cannot delete the last conversation",
            ));
        }

        self.conversations.remove(id);
        if self.active_id == id {
            self.active_id = self.first_id();
        }
        tracing::debug!(
            "[ConversationStore] Deleted conversation '{}', active is '{}'",
            id,
            self.active_id
        );

        self.write_through().await;
        Ok(())
    }

    /// Renames a conversation to the trimmed `new_name`.
    pub async fn rename(&mut self, id: &str, new_name: &str) -> Result<()> {
        let trimmed = new_name.trim();
        if trimmed.is_empty() {
            return Err(GemchatError::validation("conversation name cannot be empty"));
        }

        let conversation = self.get_mut(id)?;
        conversation.name = trimmed.to_string();

        self.write_through().await;
        Ok(())
    }

    pub async fn append_message(&mut self, id: &str, message: Message) -> Result<()> {
        self.get_mut(id)?.history.push(message);
        self.write_through().await;
        Ok(())
    }

    /// Overwrites one generation setting. Values are not range-checked.
    pub async fn update_generation_config(
        &mut self,
        id: &str,
        setting: GenerationSetting,
    ) -> Result<()> {
        self.get_mut(id)?.generation_config.apply(setting);
        self.write_through().await;
        Ok(())
    }

    pub async fn set_active(&mut self, id: &str) -> Result<()> {
        if !self.conversations.contains_key(id) {
            return Err(GemchatError::not_found("conversation", id));
        }
        self.active_id = id.to_string();
        self.write_through().await;
        Ok(())
    }

    /// Snapshot of the persisted state.
    pub fn archive(&self) -> ConversationArchive {
        ConversationArchive {
            conversations: self.conversations.clone(),
            active_id: Some(self.active_id.clone()),
        }
    }

    /// Writes the full archive to the repository.
    pub async fn persist(&self) -> Result<()> {
        self.repository.save(&self.archive()).await
    }

    async fn write_through(&self) {
        if let Err(e) = self.persist().await {
            tracing::warn!("[ConversationStore] Failed to persist conversations: {}", e);
        }
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Conversation> {
        self.conversations
            .get_mut(id)
            .ok_or_else(|| GemchatError::not_found("conversation", id))
    }

    fn first_id(&self) -> String {
        self.conversations.keys().next().cloned().unwrap_or_default()
    }

    fn next_id(&mut self) -> String {
        let now = chrono::Utc::now().timestamp_millis();
        let mut millis = now.max(self.last_id_millis + 1);
        while self
            .conversations
            .contains_key(&format!("{ID_PREFIX}{millis}"))
        {
            millis += 1;
        }
        self.last_id_millis = millis;
        format!("{ID_PREFIX}{millis}")
    }
}

fn parse_id_millis(id: &str) -> Option<i64> {
    id.strip_prefix(ID_PREFIX)?.parse().ok()
}
