//! Conversation persistence trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::model::Conversation;
use crate::error::Result;

/// Everything the store persists: the threads and the active selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationArchive {
    pub conversations: BTreeMap<String, Conversation>,
    #[serde(default)]
    pub active_id: Option<String>,
}

/// Storage backend for the conversation archive.
///
/// The whole archive is read and written as one unit, so implementations
/// only need to make a single write atomic.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Reads the archive.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(archive))`: an archive was stored and could be migrated
    /// - `Ok(None)`: nothing stored yet
    /// - `Err(_)`: the stored data could not be read or migrated
    async fn load(&self) -> Result<Option<ConversationArchive>>;

    /// Replaces the stored archive.
    async fn save(&self, archive: &ConversationArchive) -> Result<()>;
}
