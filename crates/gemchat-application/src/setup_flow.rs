//! Setup flow: capturing, validating, restoring and resetting credentials.

use std::sync::Arc;

use tokio::sync::RwLock;

use gemchat_core::config::SetupSettings;
use gemchat_core::credentials::{CredentialRepository, Credentials};
use gemchat_core::{GemchatError, Result};
use gemchat_interaction::ModelClient;

/// Whether the app can talk to a model yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupState {
    SetupRequired,
    Ready { model_name: String },
}

impl SetupState {
    pub fn is_ready(&self) -> bool {
        matches!(self, SetupState::Ready { .. })
    }
}

pub struct SetupFlow {
    client: Arc<RwLock<ModelClient>>,
    credentials: Arc<dyn CredentialRepository>,
    settings: SetupSettings,
    state: SetupState,
}

impl SetupFlow {
    pub fn new(
        client: Arc<RwLock<ModelClient>>,
        credentials: Arc<dyn CredentialRepository>,
        settings: SetupSettings,
    ) -> Self {
        Self {
            client,
            credentials,
            settings,
            state: SetupState::SetupRequired,
        }
    }

    pub fn state(&self) -> &SetupState {
        &self.state
    }

    /// Initializes the client from stored credentials, if any.
    pub async fn restore(&mut self) -> SetupState {
        let stored = match self.credentials.load().await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("[SetupFlow] Stored credentials unreadable: {}", e);
                None
            }
        };

        self.state = match stored {
            Some(credentials) => {
                let mut client = self.client.write().await;
                match client.initialize(&credentials.api_key, Some(&credentials.model_name)) {
                    Ok(()) => SetupState::Ready {
                        model_name: credentials.model_name,
                    },
                    Err(e) => {
                        tracing::warn!("[SetupFlow] Stored credentials rejected: {}", e);
                        SetupState::SetupRequired
                    }
                }
            }
            None => SetupState::SetupRequired,
        };

        tracing::debug!("[SetupFlow] restore() -> {:?}", self.state);
        self.state.clone()
    }

    /// Validates and applies new credentials.
    ///
    /// Blank input is rejected without touching any state. When the client
    /// refuses the credentials, stored ones are cleared (and the client
    /// reset) if `clear_credentials_on_failure` is set; otherwise the
    /// previous configuration stays in place.
    pub async fn submit(&mut self, api_key: &str, model_name: &str) -> Result<()> {
        let api_key = api_key.trim();
        let model_name = model_name.trim();
        if api_key.is_empty() {
            return Err(GemchatError::validation("Please enter your Gemini API key."));
        }
        if model_name.is_empty() {
            return Err(GemchatError::validation(
                "Please enter a default model name (e.g., gemini-2.0-flash).",
            ));
        }

        let previous = self.client.read().await.handle();
        let init_result = self
            .client
            .write()
            .await
            .initialize(api_key, Some(model_name));

        if let Err(e) = init_result {
            tracing::warn!("[SetupFlow] Failed to initialize model client: {}", e);
            if self.settings.clear_credentials_on_failure {
                self.clear_stored().await;
                self.client.write().await.reset();
                self.state = SetupState::SetupRequired;
            }
            return Err(e);
        }

        if let Err(e) = self
            .credentials
            .save(&Credentials::new(api_key, model_name))
            .await
        {
            // Keep the client on the configuration the state describes.
            tracing::warn!("[SetupFlow] Failed to save credentials: {}", e);
            self.client.write().await.restore(previous);
            return Err(e);
        }
        self.state = SetupState::Ready {
            model_name: model_name.to_string(),
        };
        tracing::info!("[SetupFlow] Configured model '{}'", model_name);
        Ok(())
    }

    /// Forgets the credentials and returns to `SetupRequired`.
    pub async fn reset(&mut self) -> Result<()> {
        self.credentials.clear().await?;
        self.client.write().await.reset();
        self.state = SetupState::SetupRequired;
        tracing::info!("[SetupFlow] Reset");
        Ok(())
    }

    async fn clear_stored(&self) {
        if let Err(e) = self.credentials.clear().await {
            tracing::warn!("[SetupFlow] Failed to clear stored credentials: {}", e);
        }
    }
}
