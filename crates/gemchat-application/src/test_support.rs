//! In-memory doubles shared by the application tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use gemchat_core::conversation::{ConversationArchive, ConversationRepository, GenerationConfig};
use gemchat_core::credentials::{CredentialRepository, Credentials};
use gemchat_core::generation::{ChatTurn, GenerationBackend, PromptPart, RemoteCallError};
use gemchat_core::{GemchatError, Result};
use gemchat_interaction::BackendConnector;

/// Backend that answers every call with a fixed result.
pub struct ScriptedBackend {
    reply: std::result::Result<String, RemoteCallError>,
    gate: Option<Notify>,
    chats: Mutex<Vec<Vec<ChatTurn>>>,
    prompts: Mutex<Vec<Vec<PromptPart>>>,
}

impl ScriptedBackend {
    pub fn replying(reply: &str) -> Self {
        Self::new(Ok(reply.to_string()), None)
    }

    pub fn failing(error: RemoteCallError) -> Self {
        Self::new(Err(error), None)
    }

    /// Replies only after [`release`](Self::release) is called.
    pub fn gated(reply: &str) -> Self {
        Self::new(Ok(reply.to_string()), Some(Notify::new()))
    }

    fn new(reply: std::result::Result<String, RemoteCallError>, gate: Option<Notify>) -> Self {
        Self {
            reply,
            gate,
            chats: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn chats(&self) -> Vec<Vec<ChatTurn>> {
        self.chats.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> Vec<Vec<PromptPart>> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.chats.lock().unwrap().len() + self.prompts.lock().unwrap().len()
    }

    async fn answer(&self) -> std::result::Result<String, RemoteCallError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.reply.clone()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn chat(
        &self,
        turns: &[ChatTurn],
        _config: &GenerationConfig,
    ) -> std::result::Result<String, RemoteCallError> {
        self.chats.lock().unwrap().push(turns.to_vec());
        self.answer().await
    }

    async fn generate(
        &self,
        parts: &[PromptPart],
        _config: &GenerationConfig,
    ) -> std::result::Result<String, RemoteCallError> {
        self.prompts.lock().unwrap().push(parts.to_vec());
        self.answer().await
    }
}

/// Connector that hands out one shared backend, or refuses every key.
pub struct MockConnector {
    backend: Option<Arc<ScriptedBackend>>,
}

impl MockConnector {
    pub fn with_backend(backend: Arc<ScriptedBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    pub fn working() -> Self {
        Self::with_backend(Arc::new(ScriptedBackend::replying("ok")))
    }

    pub fn failing() -> Self {
        Self { backend: None }
    }
}

impl BackendConnector for MockConnector {
    fn connect(&self, _credentials: &Credentials) -> Result<Arc<dyn GenerationBackend>> {
        match &self.backend {
            Some(backend) => Ok(backend.clone()),
            None => Err(GemchatError::validation("API key not valid")),
        }
    }
}

#[derive(Default)]
pub struct MemoryCredentialRepository {
    stored: Mutex<Option<Credentials>>,
    fail_save: AtomicBool,
}

impl MemoryCredentialRepository {
    pub fn with(credentials: Credentials) -> Self {
        Self {
            stored: Mutex::new(Some(credentials)),
            fail_save: AtomicBool::new(false),
        }
    }

    /// Makes every later `save` fail.
    pub fn fail_saves(&self) {
        self.fail_save.store(true, Ordering::SeqCst);
    }

    pub fn stored(&self) -> Option<Credentials> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialRepository for MemoryCredentialRepository {
    async fn load(&self) -> Result<Option<Credentials>> {
        Ok(self.stored())
    }

    async fn save(&self, credentials: &Credentials) -> Result<()> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(GemchatError::io("disk full"));
        }
        *self.stored.lock().unwrap() = Some(credentials.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.stored.lock().unwrap() = None;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryConversationRepository {
    archive: Mutex<Option<ConversationArchive>>,
}

impl MemoryConversationRepository {
    pub fn stored(&self) -> Option<ConversationArchive> {
        self.archive.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversationRepository for MemoryConversationRepository {
    async fn load(&self) -> Result<Option<ConversationArchive>> {
        Ok(self.stored())
    }

    async fn save(&self, archive: &ConversationArchive) -> Result<()> {
        *self.archive.lock().unwrap() = Some(archive.clone());
        Ok(())
    }
}
