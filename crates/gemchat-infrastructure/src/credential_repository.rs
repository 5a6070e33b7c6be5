//! Credential repository.
//!
//! Stores the API key and model under the `credentials` key. The file is
//! written with owner-only permissions on Unix; the key never reaches logs.

use async_trait::async_trait;
use version_migrate::Migrator;

use gemchat_core::credentials::{CredentialRepository, Credentials};
use gemchat_core::{GemchatError, Result};

use crate::dto::create_credentials_migrator;
use crate::storage::JsonKeyValueStore;

pub struct FileCredentialRepository {
    store: JsonKeyValueStore,
    migrator: Migrator,
}

impl FileCredentialRepository {
    pub const KEY: &'static str = "credentials";

    pub fn new(store: JsonKeyValueStore) -> Self {
        Self {
            store,
            migrator: create_credentials_migrator(),
        }
    }
}

#[async_trait]
impl CredentialRepository for FileCredentialRepository {
    async fn load(&self) -> Result<Option<Credentials>> {
        let store = self.store.clone();
        let value = tokio::task::spawn_blocking(move || store.get(Self::KEY))
            .await
            .map_err(|e| GemchatError::internal(format!("Storage task failed: {}", e)))??;

        let Some(value) = value else {
            return Ok(None);
        };

        let credentials: Credentials = self
            .migrator
            .load_flat_from(Self::KEY, value)
            .map_err(|e| GemchatError::Migration(format!("Failed to read credentials: {}", e)))?;

        if credentials.api_key.is_empty() || credentials.model_name.is_empty() {
            return Ok(None);
        }
        Ok(Some(credentials))
    }

    async fn save(&self, credentials: &Credentials) -> Result<()> {
        let serialized = self
            .migrator
            .save_domain_flat(Self::KEY, credentials.clone())
            .map_err(|e| GemchatError::Migration(format!("Failed to serialize credentials: {}", e)))?;

        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.put_private(Self::KEY, &serialized))
            .await
            .map_err(|e| GemchatError::internal(format!("Storage task failed: {}", e)))??;

        tracing::info!(
            "[FileCredentialRepository] Saved credentials for model '{}'",
            credentials.model_name
        );
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.remove(Self::KEY))
            .await
            .map_err(|e| GemchatError::internal(format!("Storage task failed: {}", e)))??;

        tracing::info!("[FileCredentialRepository] Cleared stored credentials");
        Ok(())
    }
}
