//! Application context: wires the model client, setup flow and session.
//!
//! The conversation store and session controller only exist once setup has
//! completed; they are rebuilt whenever a new model is configured.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use gemchat_core::config::AppConfig;
use gemchat_core::conversation::{ConversationRepository, ConversationStore};
use gemchat_core::credentials::CredentialRepository;
use gemchat_core::{GemchatError, Result};
use gemchat_infrastructure::storage::JsonKeyValueStore;
use gemchat_infrastructure::{FileConversationRepository, FileCredentialRepository, GemchatPaths};
use gemchat_interaction::{BackendConnector, GeminiConnector, ModelClient};

use crate::session_controller::SessionController;
use crate::setup_flow::{SetupFlow, SetupState};

struct Session {
    store: Arc<Mutex<ConversationStore>>,
    controller: Arc<SessionController>,
}

pub struct AppContext {
    config: AppConfig,
    client: Arc<RwLock<ModelClient>>,
    setup: SetupFlow,
    conversations: Arc<dyn ConversationRepository>,
    session: Option<Session>,
}

impl AppContext {
    pub fn new(
        config: AppConfig,
        connector: Arc<dyn BackendConnector>,
        credentials: Arc<dyn CredentialRepository>,
        conversations: Arc<dyn ConversationRepository>,
    ) -> Self {
        let client = Arc::new(RwLock::new(ModelClient::new(connector)));
        let setup = SetupFlow::new(client.clone(), credentials, config.setup.clone());
        Self {
            config,
            client,
            setup,
            conversations,
            session: None,
        }
    }

    /// Production wiring: Gemini REST backend and file repositories under `paths`.
    pub fn from_paths(paths: &GemchatPaths, config: AppConfig) -> Self {
        let store = JsonKeyValueStore::new(paths.store_dir());
        let connector = Arc::new(GeminiConnector::new(config.api.clone()));
        Self::new(
            config,
            connector,
            Arc::new(FileCredentialRepository::new(store.clone())),
            Arc::new(FileConversationRepository::new(store)),
        )
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn client(&self) -> Arc<RwLock<ModelClient>> {
        self.client.clone()
    }

    pub fn setup_state(&self) -> &SetupState {
        self.setup.state()
    }

    /// Restores stored credentials and opens the session when they work.
    pub async fn start(&mut self) -> SetupState {
        let state = self.setup.restore().await;
        self.sync_session(&state).await;
        state
    }

    /// Runs the setup flow and reloads the store for the new model.
    pub async fn complete_setup(&mut self, api_key: &str, model_name: &str) -> Result<()> {
        let result = self.setup.submit(api_key, model_name).await;
        let state = self.setup.state().clone();
        self.sync_session(&state).await;
        result
    }

    /// Forgets the credentials and closes the session.
    pub async fn reset_setup(&mut self) -> Result<()> {
        self.setup.reset().await?;
        self.session = None;
        Ok(())
    }

    pub fn store(&self) -> Result<Arc<Mutex<ConversationStore>>> {
        self.session
            .as_ref()
            .map(|s| s.store.clone())
            .ok_or(GemchatError::NotConfigured)
    }

    pub fn controller(&self) -> Result<Arc<SessionController>> {
        self.session
            .as_ref()
            .map(|s| s.controller.clone())
            .ok_or(GemchatError::NotConfigured)
    }

    /// Creates a conversation and makes it active.
    pub async fn new_conversation(&self, name: Option<String>) -> Result<String> {
        let store = self.store()?;
        let mut store = store.lock().await;
        let id = store.create(name).await;
        store.set_active(&id).await?;
        Ok(id)
    }

    async fn sync_session(&mut self, state: &SetupState) {
        match state {
            SetupState::Ready { model_name } => {
                let store = ConversationStore::load(self.conversations.clone(), model_name).await;
                tracing::info!(
                    "[AppContext] Session opened: {} conversation(s) on '{}'",
                    store.len(),
                    model_name
                );
                let store = Arc::new(Mutex::new(store));
                let controller = Arc::new(SessionController::new(store.clone(), self.client.clone()));
                self.session = Some(Session { store, controller });
            }
            SetupState::SetupRequired => {
                if self.session.take().is_some() {
                    tracing::info!("[AppContext] Session closed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        MemoryConversationRepository, MemoryCredentialRepository, MockConnector,
    };
    use gemchat_core::credentials::Credentials;
    use tempfile::TempDir;

    fn context(
        connector: MockConnector,
        credentials: Arc<MemoryCredentialRepository>,
    ) -> (AppContext, Arc<MemoryConversationRepository>) {
        let conversations = Arc::new(MemoryConversationRepository::default());
        let ctx = AppContext::new(
            AppConfig::default(),
            Arc::new(connector),
            credentials,
            conversations.clone(),
        );
        (ctx, conversations)
    }

    #[tokio::test]
    async fn test_start_without_credentials_has_no_session() {
        let (mut ctx, _) = context(
            MockConnector::working(),
            Arc::new(MemoryCredentialRepository::default()),
        );

        assert_eq!(ctx.start().await, SetupState::SetupRequired);
        assert!(matches!(ctx.store(), Err(e) if e.is_not_configured()));
        assert!(matches!(ctx.controller(), Err(e) if e.is_not_configured()));
        assert!(ctx.new_conversation(None).await.unwrap_err().is_not_configured());
    }

    #[tokio::test]
    async fn test_start_with_stored_credentials_opens_session() {
        let credentials = Arc::new(MemoryCredentialRepository::with(Credentials::new(
            "key",
            "gemini-2.0-flash",
        )));
        let (mut ctx, conversations) = context(MockConnector::working(), credentials);

        assert!(ctx.start().await.is_ready());
        let store = ctx.store().unwrap();
        let store = store.lock().await;
        assert_eq!(store.len(), 1);
        assert_eq!(store.active().unwrap().name, "New Chat 1");
        assert!(conversations.stored().is_some());
    }

    #[tokio::test]
    async fn test_complete_setup_rebinds_conversations_to_new_model() {
        let (mut ctx, _) = context(
            MockConnector::working(),
            Arc::new(MemoryCredentialRepository::default()),
        );
        ctx.complete_setup("key", "gemini-2.0-flash").await.unwrap();
        ctx.new_conversation(Some("Second".into())).await.unwrap();

        ctx.complete_setup("key", "gemini-2.5-pro").await.unwrap();

        let store = ctx.store().unwrap();
        let store = store.lock().await;
        assert_eq!(store.len(), 2);
        assert_eq!(store.configured_model(), "gemini-2.5-pro");
        assert!(store.conversations().all(|c| c.model == "gemini-2.5-pro"));
    }

    #[tokio::test]
    async fn test_failed_credential_save_keeps_client_and_store_on_same_model() {
        let credentials = Arc::new(MemoryCredentialRepository::default());
        let (mut ctx, _) = context(MockConnector::working(), credentials.clone());
        ctx.complete_setup("key", "gemini-2.0-flash").await.unwrap();

        credentials.fail_saves();
        assert!(ctx.complete_setup("key2", "gemini-2.5-pro").await.is_err());

        let client_model = ctx.client().read().await.model_name().map(str::to_string);
        let store = ctx.store().unwrap();
        let store = store.lock().await;
        assert_eq!(client_model.as_deref(), Some(store.configured_model()));
        assert_eq!(store.configured_model(), "gemini-2.0-flash");
    }

    #[tokio::test]
    async fn test_new_conversation_becomes_active() {
        let (mut ctx, _) = context(
            MockConnector::working(),
            Arc::new(MemoryCredentialRepository::default()),
        );
        ctx.complete_setup("key", "gemini-2.0-flash").await.unwrap();

        let id = ctx.new_conversation(Some("Ideas".into())).await.unwrap();
        let store = ctx.store().unwrap();
        let store = store.lock().await;
        assert_eq!(store.active_id(), id);
        assert_eq!(store.active().unwrap().name, "Ideas");
    }

    #[tokio::test]
    async fn test_reset_setup_closes_session() {
        let credentials = Arc::new(MemoryCredentialRepository::with(Credentials::new(
            "key",
            "gemini-2.0-flash",
        )));
        let (mut ctx, _) = context(MockConnector::working(), credentials.clone());
        ctx.start().await;
        assert!(ctx.store().is_ok());

        ctx.reset_setup().await.unwrap();
        assert!(ctx.store().is_err());
        assert_eq!(credentials.stored(), None);
    }

    #[tokio::test]
    async fn test_failed_setup_leaves_no_session() {
        let (mut ctx, _) = context(
            MockConnector::failing(),
            Arc::new(MemoryCredentialRepository::default()),
        );

        assert!(ctx.complete_setup("bad", "gemini-2.0-flash").await.is_err());
        assert_eq!(ctx.setup_state(), &SetupState::SetupRequired);
        assert!(ctx.controller().is_err());
    }

    #[tokio::test]
    async fn test_from_paths_persists_under_root() {
        let temp_dir = TempDir::new().unwrap();
        let paths = GemchatPaths::with_root(temp_dir.path());

        let mut ctx = AppContext::from_paths(&paths, AppConfig::default());
        assert_eq!(ctx.start().await, SetupState::SetupRequired);
        assert!(!temp_dir.path().join("credentials.json").exists());
    }
}
