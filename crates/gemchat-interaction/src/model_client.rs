//! ModelClient - the configured connection to the generation service.
//!
//! One instance is owned by the application context and shared by
//! reference. `initialize` replaces its state wholesale; nothing else
//! mutates it.

use std::collections::BTreeSet;
use std::sync::Arc;

use gemchat_core::config::ApiSettings;
use gemchat_core::conversation::{GenerationConfig, Message};
use gemchat_core::credentials::{Credentials, DEFAULT_MODEL, ModelCapability, capabilities_of};
use gemchat_core::generation::{ChatTurn, GenerationBackend, PromptPart, RemoteCallError, TurnRole};
use gemchat_core::{GemchatError, Result};

use crate::gemini_api_client::GeminiApiClient;

/// Builds a backend for a set of credentials.
pub trait BackendConnector: Send + Sync {
    fn connect(&self, credentials: &Credentials) -> Result<Arc<dyn GenerationBackend>>;
}

/// Connects to the Gemini REST API.
pub struct GeminiConnector {
    settings: ApiSettings,
}

impl GeminiConnector {
    pub fn new(settings: ApiSettings) -> Self {
        Self { settings }
    }
}

impl BackendConnector for GeminiConnector {
    fn connect(&self, credentials: &Credentials) -> Result<Arc<dyn GenerationBackend>> {
        Ok(Arc::new(GeminiApiClient::new(credentials, &self.settings)?))
    }
}

/// Snapshot of an initialized client.
///
/// Cheap to clone, so callers can release any lock on the [`ModelClient`]
/// before awaiting a remote call.
#[derive(Clone)]
pub struct ModelHandle {
    backend: Arc<dyn GenerationBackend>,
    model_name: String,
    capabilities: BTreeSet<ModelCapability>,
}

impl ModelHandle {
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn capabilities(&self) -> &BTreeSet<ModelCapability> {
        &self.capabilities
    }

    pub fn supports_vision(&self) -> bool {
        self.capabilities.contains(&ModelCapability::Vision)
    }

    /// Sends `history` followed by `new_text` as a multi-turn chat.
    ///
    /// Turns with empty text are dropped before sending.
    pub async fn send_chat_turn(
        &self,
        history: &[Message],
        new_text: &str,
        config: &GenerationConfig,
    ) -> std::result::Result<String, RemoteCallError> {
        let mut turns = ChatTurn::from_history(history);
        if !new_text.is_empty() {
            turns.push(ChatTurn::new(TurnRole::User, new_text));
        }
        if turns.is_empty() {
            return Err(RemoteCallError::InvalidRequest(
                "nothing to send: all turns are empty".into(),
            ));
        }

        self.backend.chat(&turns, &config.for_request()).await
    }

    /// One-shot call; no earlier turns are sent.
    pub async fn send_multimodal_turn(
        &self,
        parts: &[PromptPart],
        config: &GenerationConfig,
    ) -> std::result::Result<String, RemoteCallError> {
        self.backend.generate(parts, &config.for_request()).await
    }
}

pub struct ModelClient {
    connector: Arc<dyn BackendConnector>,
    active: Option<ModelHandle>,
}

impl ModelClient {
    pub fn new(connector: Arc<dyn BackendConnector>) -> Self {
        Self {
            connector,
            active: None,
        }
    }

    /// Connects with `api_key` and `model_name` (default `gemini-2.0-flash`).
    ///
    /// On failure the previous state is kept.
    pub fn initialize(&mut self, api_key: &str, model_name: Option<&str>) -> Result<()> {
        if api_key.is_empty() {
            return Err(GemchatError::validation("API key is required"));
        }
        let model_name = match model_name {
            Some(name) if !name.is_empty() => name,
            _ => {
                tracing::warn!(
                    "[ModelClient] No model given, defaulting to '{}'",
                    DEFAULT_MODEL
                );
                DEFAULT_MODEL
            }
        };

        let credentials = Credentials::new(api_key, model_name);
        let backend = self.connector.connect(&credentials)?;

        self.active = Some(ModelHandle {
            backend,
            model_name: model_name.to_string(),
            capabilities: capabilities_of(model_name),
        });
        tracing::info!("[ModelClient] Initialized with model '{}'", model_name);
        Ok(())
    }

    /// Puts back a handle taken with [`handle`](Self::handle), undoing a
    /// later `initialize`.
    pub fn restore(&mut self, previous: Option<ModelHandle>) {
        match &previous {
            Some(handle) => tracing::info!("[ModelClient] Restored model '{}'", handle.model_name),
            None => tracing::info!("[ModelClient] Restored unconfigured state"),
        }
        self.active = previous;
    }

    pub fn reset(&mut self) {
        if self.active.take().is_some() {
            tracing::info!("[ModelClient] Reset");
        }
    }

    pub fn is_configured(&self) -> bool {
        self.active.is_some()
    }

    pub fn handle(&self) -> Option<ModelHandle> {
        self.active.clone()
    }

    pub fn model_name(&self) -> Option<&str> {
        self.active.as_ref().map(|h| h.model_name.as_str())
    }

    /// Capabilities of the configured model; empty before `initialize`.
    pub fn capabilities(&self) -> BTreeSet<ModelCapability> {
        self.active
            .as_ref()
            .map(|h| h.capabilities.clone())
            .unwrap_or_default()
    }

    pub async fn send_chat_turn(
        &self,
        history: &[Message],
        new_text: &str,
        config: &GenerationConfig,
    ) -> std::result::Result<String, RemoteCallError> {
        match &self.active {
            Some(handle) => handle.send_chat_turn(history, new_text, config).await,
            None => Err(RemoteCallError::NotConfigured),
        }
    }

    pub async fn send_multimodal_turn(
        &self,
        parts: &[PromptPart],
        config: &GenerationConfig,
    ) -> std::result::Result<String, RemoteCallError> {
        match &self.active {
            Some(handle) => handle.send_multimodal_turn(parts, config).await,
            None => Err(RemoteCallError::NotConfigured),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBackend {
        chats: Mutex<Vec<(Vec<ChatTurn>, GenerationConfig)>>,
        prompts: Mutex<Vec<Vec<PromptPart>>>,
    }

    #[async_trait]
    impl GenerationBackend for RecordingBackend {
        async fn chat(
            &self,
            turns: &[ChatTurn],
            config: &GenerationConfig,
        ) -> std::result::Result<String, RemoteCallError> {
            self.chats
                .lock()
                .unwrap()
                .push((turns.to_vec(), config.clone()));
            Ok("chat reply".into())
        }

        async fn generate(
            &self,
            parts: &[PromptPart],
            _config: &GenerationConfig,
        ) -> std::result::Result<String, RemoteCallError> {
            self.prompts.lock().unwrap().push(parts.to_vec());
            Ok("generate reply".into())
        }
    }

    struct MockConnector {
        backend: Arc<RecordingBackend>,
    }

    impl BackendConnector for MockConnector {
        fn connect(&self, _credentials: &Credentials) -> Result<Arc<dyn GenerationBackend>> {
            Ok(self.backend.clone())
        }
    }

    fn client() -> (ModelClient, Arc<RecordingBackend>) {
        let backend = Arc::new(RecordingBackend::default());
        let client = ModelClient::new(Arc::new(MockConnector {
            backend: backend.clone(),
        }));
        (client, backend)
    }

    #[test]
    fn test_initialize_rejects_empty_key() {
        let (mut client, _) = client();
        assert!(client.initialize("", Some("gemini-2.5-pro")).unwrap_err().is_validation());
        assert!(!client.is_configured());
    }

    #[test]
    fn test_initialize_defaults_model() {
        let (mut client, _) = client();
        client.initialize("key", None).unwrap();
        assert_eq!(client.model_name(), Some("gemini-2.0-flash"));
        assert!(client.capabilities().contains(&ModelCapability::Vision));
    }

    #[test]
    fn test_reinitialize_replaces_state() {
        let (mut client, _) = client();
        client.initialize("key", Some("gemini-2.0-flash")).unwrap();
        client.initialize("key", Some("gemini-2.5-pro")).unwrap();

        assert_eq!(client.model_name(), Some("gemini-2.5-pro"));
        assert_eq!(client.capabilities(), BTreeSet::from([ModelCapability::Text]));

        client.reset();
        assert!(!client.is_configured());
        assert!(client.capabilities().is_empty());
    }

    #[test]
    fn test_restore_undoes_initialize() {
        let (mut client, _) = client();
        client.initialize("key", Some("gemini-2.0-flash")).unwrap();
        let previous = client.handle();

        client.initialize("key", Some("gemini-2.5-pro")).unwrap();
        client.restore(previous);
        assert_eq!(client.model_name(), Some("gemini-2.0-flash"));
        assert!(client.capabilities().contains(&ModelCapability::Vision));

        client.restore(None);
        assert!(!client.is_configured());
    }

    #[tokio::test]
    async fn test_uninitialized_calls_return_not_configured() {
        let (client, backend) = client();
        let config = GenerationConfig::default();

        assert_eq!(
            client.send_chat_turn(&[], "hi", &config).await,
            Err(RemoteCallError::NotConfigured)
        );
        assert_eq!(
            client
                .send_multimodal_turn(&[PromptPart::Text("hi".into())], &config)
                .await,
            Err(RemoteCallError::NotConfigured)
        );
        assert!(backend.chats.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chat_turn_appends_prompt_and_forces_fixed_fields() {
        let (mut client, backend) = client();
        client.initialize("key", None).unwrap();

        let history = vec![Message::user("first", None), Message::assistant("")];
        let config = GenerationConfig {
            candidate_count: 3,
            stop_sequences: vec!["stop".into()],
            max_output_tokens: 64,
            temperature: 0.1,
        };

        let reply = client.send_chat_turn(&history, "second", &config).await.unwrap();
        assert_eq!(reply, "chat reply");

        let chats = backend.chats.lock().unwrap();
        let (turns, sent_config) = &chats[0];
        assert_eq!(
            turns,
            &vec![
                ChatTurn::new(TurnRole::User, "first"),
                ChatTurn::new(TurnRole::User, "second"),
            ]
        );
        assert_eq!(sent_config.candidate_count, 1);
        assert!(sent_config.stop_sequences.is_empty());
        assert_eq!(sent_config.max_output_tokens, 64);
    }

    #[tokio::test]
    async fn test_chat_turn_with_only_empty_turns_is_invalid() {
        let (mut client, backend) = client();
        client.initialize("key", None).unwrap();

        let result = client
            .send_chat_turn(&[Message::assistant("")], "", &GenerationConfig::default())
            .await;
        assert!(matches!(result, Err(RemoteCallError::InvalidRequest(_))));
        assert!(backend.chats.lock().unwrap().is_empty());
    }
}
