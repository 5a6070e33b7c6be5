//! Session controller: one send action from user input to stored reply.
//!
//! A send appends the user message, calls the model and appends the reply.
//! Remote failures become assistant messages instead of errors, so the
//! conversation history stays a complete log of what happened.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, RwLock};

use gemchat_core::conversation::{ConversationStore, GenerationConfig, ImageAttachment, Message};
use gemchat_core::generation::{PromptPart, RemoteCallError};
use gemchat_core::{GemchatError, Result};
use gemchat_interaction::{ModelClient, ModelHandle, encode_image};

/// Draft input that has not been sent yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingInput {
    pub text: String,
    pub image: Option<ImageAttachment>,
    pub multimodal: bool,
}

impl PendingInput {
    /// Attaching an image opts into multimodal mode.
    pub fn attach_image(&mut self, image: ImageAttachment) {
        self.image = Some(image);
        self.multimodal = true;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.image.is_none()
    }
}

/// Result of a send that was not rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Nothing to send; no state changed.
    Skipped,
    /// The reply was appended.
    Replied,
    /// The call failed; an error message was appended in place of a reply.
    Failed(RemoteCallError),
}

pub struct SessionController {
    store: Arc<Mutex<ConversationStore>>,
    client: Arc<RwLock<ModelClient>>,
    in_flight: Arc<StdMutex<HashSet<String>>>,
}

impl SessionController {
    pub fn new(store: Arc<Mutex<ConversationStore>>, client: Arc<RwLock<ModelClient>>) -> Self {
        Self {
            store,
            client,
            in_flight: Arc::new(StdMutex::new(HashSet::new())),
        }
    }

    /// True while a send for `conversation_id` is awaiting the model.
    pub fn is_busy(&self, conversation_id: &str) -> bool {
        lock_ignoring_poison(&self.in_flight).contains(conversation_id)
    }

    /// Sends one user turn to `conversation_id`.
    ///
    /// # Errors
    ///
    /// - `NotConfigured` when setup has not completed
    /// - `NotFound` for an unknown conversation
    /// - `Busy` when a send for the same conversation is in flight
    ///
    /// Remote failures are not errors; see [`SendOutcome::Failed`].
    pub async fn send(
        &self,
        conversation_id: &str,
        text: &str,
        image: Option<ImageAttachment>,
        multimodal: bool,
    ) -> Result<SendOutcome> {
        if text.trim().is_empty() && image.is_none() {
            return Ok(SendOutcome::Skipped);
        }

        let handle = self
            .client
            .read()
            .await
            .handle()
            .ok_or(GemchatError::NotConfigured)?;

        let _in_flight = InFlightGuard::acquire(&self.in_flight, conversation_id)?;

        let (prior_history, config) = {
            let mut store = self.store.lock().await;
            let conversation = store
                .get(conversation_id)
                .ok_or_else(|| GemchatError::not_found("conversation", conversation_id))?;
            let prior = conversation.history.clone();
            let config = conversation.generation_config.clone();

            store
                .append_message(conversation_id, Message::user(text, image.clone()))
                .await?;
            (prior, config)
        };

        let use_multimodal = multimodal && handle.supports_vision();
        let result = match image {
            Some(image) if use_multimodal => {
                tracing::debug!(
                    "[SessionController] Multimodal send to '{}' with {}",
                    conversation_id,
                    image.file_name()
                );
                Self::send_multimodal(&handle, text, &image, &config).await
            }
            _ => {
                tracing::debug!(
                    "[SessionController] Chat send to '{}' with {} prior message(s)",
                    conversation_id,
                    prior_history.len()
                );
                handle.send_chat_turn(&prior_history, text, &config).await
            }
        };

        let (reply, outcome) = match result {
            Ok(reply) => (Message::assistant(reply), SendOutcome::Replied),
            Err(e) => {
                tracing::warn!(
                    "[SessionController] Generation failed for '{}': {}",
                    conversation_id,
                    e
                );
                (Message::assistant(failure_content(&e)), SendOutcome::Failed(e))
            }
        };

        let mut store = self.store.lock().await;
        if let Err(e) = store.append_message(conversation_id, reply).await {
            // The conversation was deleted while the call was running.
            tracing::warn!(
                "[SessionController] Dropping reply for '{}': {}",
                conversation_id,
                e
            );
        }

        Ok(outcome)
    }

    /// Sends the draft and clears it once the send has completed.
    ///
    /// Skipped or rejected sends leave the draft as it was.
    pub async fn submit(
        &self,
        conversation_id: &str,
        draft: &mut PendingInput,
    ) -> Result<SendOutcome> {
        let outcome = self
            .send(
                conversation_id,
                &draft.text,
                draft.image.clone(),
                draft.multimodal,
            )
            .await?;

        if outcome != SendOutcome::Skipped {
            draft.clear();
        }
        Ok(outcome)
    }

    async fn send_multimodal(
        handle: &ModelHandle,
        text: &str,
        image: &ImageAttachment,
        config: &GenerationConfig,
    ) -> std::result::Result<String, RemoteCallError> {
        let inline = encode_image(image).await?;
        let parts = [PromptPart::Text(text.to_string()), PromptPart::Image(inline)];
        handle.send_multimodal_turn(&parts, config).await
    }
}

/// Content stored in place of a reply when generation fails.
pub fn failure_content(err: &RemoteCallError) -> String {
    format!("Error: Could not generate content. ({err})")
}

/// Marks a conversation busy for the guard's lifetime.
struct InFlightGuard {
    set: Arc<StdMutex<HashSet<String>>>,
    id: String,
}

impl InFlightGuard {
    fn acquire(set: &Arc<StdMutex<HashSet<String>>>, id: &str) -> Result<Self> {
        if !lock_ignoring_poison(set).insert(id.to_string()) {
            return Err(GemchatError::Busy(id.to_string()));
        }
        Ok(Self {
            set: set.clone(),
            id: id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock_ignoring_poison(&self.set).remove(&self.id);
    }
}

fn lock_ignoring_poison<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MemoryConversationRepository, MockConnector, ScriptedBackend};
    use gemchat_core::conversation::Sender;
    use gemchat_core::generation::{ChatTurn, TurnRole};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        controller: Arc<SessionController>,
        store: Arc<Mutex<ConversationStore>>,
        backend: Arc<ScriptedBackend>,
        chat_id: String,
    }

    async fn fixture(model: Option<&str>, backend: ScriptedBackend) -> Fixture {
        let backend = Arc::new(backend);
        let mut client = ModelClient::new(Arc::new(MockConnector::with_backend(backend.clone())));
        if let Some(model) = model {
            client.initialize("key", Some(model)).unwrap();
        }

        let store = ConversationStore::load(
            Arc::new(MemoryConversationRepository::default()),
            model.unwrap_or("gemini-2.0-flash"),
        )
        .await;
        let chat_id = store.active_id().to_string();
        let store = Arc::new(Mutex::new(store));
        let controller = Arc::new(SessionController::new(
            store.clone(),
            Arc::new(RwLock::new(client)),
        ));

        Fixture {
            controller,
            store,
            backend,
            chat_id,
        }
    }

    async fn history(fx: &Fixture) -> Vec<Message> {
        fx.store.lock().await.get(&fx.chat_id).unwrap().history.clone()
    }

    #[tokio::test]
    async fn test_empty_send_is_noop() {
        let fx = fixture(Some("gemini-2.5-pro"), ScriptedBackend::replying("hi")).await;

        for blank in ["", "   "] {
            let outcome = fx.controller.send(&fx.chat_id, blank, None, false).await.unwrap();
            assert_eq!(outcome, SendOutcome::Skipped);
        }
        assert!(history(&fx).await.is_empty());
        assert_eq!(fx.backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_image_without_caption_is_sent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cat.png");
        std::fs::write(&path, b"hello").unwrap();

        let fx = fixture(Some("gemini-2.0-flash"), ScriptedBackend::replying("a cat")).await;
        let mut draft = PendingInput::default();
        draft.attach_image(ImageAttachment::new(path.to_string_lossy(), "image/png"));
        assert!(!draft.is_empty());

        let outcome = fx.controller.submit(&fx.chat_id, &mut draft).await.unwrap();
        assert_eq!(outcome, SendOutcome::Replied);
        assert!(draft.is_empty());

        let history = history(&fx).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "");
        assert!(history[0].image.is_some());
        assert_eq!(fx.backend.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_not_configured_is_rejected_without_state_change() {
        let fx = fixture(None, ScriptedBackend::replying("hi")).await;

        let err = fx
            .controller
            .send(&fx.chat_id, "Hello", None, false)
            .await
            .unwrap_err();
        assert!(err.is_not_configured());
        assert!(history(&fx).await.is_empty());
    }

    #[tokio::test]
    async fn test_text_send_appends_user_then_assistant() {
        let fx = fixture(Some("gemini-2.5-pro"), ScriptedBackend::replying("Hi there")).await;

        let outcome = fx.controller.send(&fx.chat_id, "Hello", None, false).await.unwrap();
        assert_eq!(outcome, SendOutcome::Replied);

        let history = history(&fx).await;
        assert_eq!(
            history,
            vec![Message::user("Hello", None), Message::assistant("Hi there")]
        );
        assert!(!fx.controller.is_busy(&fx.chat_id));
    }

    #[tokio::test]
    async fn test_text_send_includes_full_history_once() {
        let fx = fixture(Some("gemini-2.5-pro"), ScriptedBackend::replying("ok")).await;
        fx.controller.send(&fx.chat_id, "first", None, false).await.unwrap();
        fx.controller.send(&fx.chat_id, "second", None, false).await.unwrap();

        let chats = fx.backend.chats();
        assert_eq!(
            chats[1],
            vec![
                ChatTurn::new(TurnRole::User, "first"),
                ChatTurn::new(TurnRole::Model, "ok"),
                ChatTurn::new(TurnRole::User, "second"),
            ]
        );
    }

    #[tokio::test]
    async fn test_remote_failure_becomes_assistant_content() {
        let failure = RemoteCallError::Http {
            status: 403,
            message: "PERMISSION_DENIED: bad key".into(),
            retry_after_secs: None,
        };
        let fx = fixture(Some("gemini-2.5-pro"), ScriptedBackend::failing(failure.clone())).await;

        let outcome = fx.controller.send(&fx.chat_id, "Hello", None, false).await.unwrap();
        assert_eq!(outcome, SendOutcome::Failed(failure));

        let history = history(&fx).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].sender, Sender::Assistant);
        assert!(history[1].content.starts_with("Error: Could not generate content."));
        assert!(history[1].content.contains("PERMISSION_DENIED"));
    }

    #[tokio::test]
    async fn test_multimodal_send_uses_single_turn_with_image() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("photo.png");
        std::fs::write(&path, b"hello").unwrap();
        let image = ImageAttachment::new(path.to_string_lossy(), "image/png");

        let fx = fixture(Some("gemini-2.0-flash"), ScriptedBackend::replying("a cat")).await;
        fx.controller.send(&fx.chat_id, "earlier", None, false).await.unwrap();

        let outcome = fx
            .controller
            .send(&fx.chat_id, "what is this?", Some(image.clone()), true)
            .await
            .unwrap();
        assert_eq!(outcome, SendOutcome::Replied);

        let prompts = fx.backend.prompts();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0][0], PromptPart::Text("what is this?".into()));
        match &prompts[0][1] {
            PromptPart::Image(inline) => {
                assert_eq!(inline.mime_type, "image/png");
                assert_eq!(inline.data, "aGVsbG8=");
            }
            other => panic!("expected image part, got {other:?}"),
        }

        let history = history(&fx).await;
        assert_eq!(history[2], Message::user("what is this?", Some(image)));
        assert_eq!(history[3], Message::assistant("a cat"));
    }

    #[tokio::test]
    async fn test_image_on_text_only_model_falls_back_to_chat() {
        let fx = fixture(Some("gemini-2.5-pro"), ScriptedBackend::replying("text reply")).await;
        let image = ImageAttachment::new("/not/read.png", "image/png");

        let outcome = fx
            .controller
            .send(&fx.chat_id, "describe", Some(image), true)
            .await
            .unwrap();
        assert_eq!(outcome, SendOutcome::Replied);
        assert!(fx.backend.prompts().is_empty());
        assert_eq!(
            fx.backend.chats()[0],
            vec![ChatTurn::new(TurnRole::User, "describe")]
        );
    }

    #[tokio::test]
    async fn test_unreadable_image_is_captured_as_failure() {
        let fx = fixture(Some("gemini-2.0-flash"), ScriptedBackend::replying("unused")).await;
        let image = ImageAttachment::new("/missing/photo.png", "image/png");

        let outcome = fx
            .controller
            .send(&fx.chat_id, "look", Some(image), true)
            .await
            .unwrap();
        assert!(matches!(outcome, SendOutcome::Failed(RemoteCallError::Image(_))));
        assert_eq!(history(&fx).await.len(), 2);
        assert_eq!(fx.backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_not_found() {
        let fx = fixture(Some("gemini-2.5-pro"), ScriptedBackend::replying("x")).await;
        let err = fx.controller.send("chat-nope", "hi", None, false).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_second_send_while_in_flight_is_busy() {
        let fx = fixture(Some("gemini-2.5-pro"), ScriptedBackend::gated("late")).await;

        let controller = fx.controller.clone();
        let chat_id = fx.chat_id.clone();
        let first = tokio::spawn(async move { controller.send(&chat_id, "one", None, false).await });

        while fx.backend.call_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(fx.controller.is_busy(&fx.chat_id));
        let err = fx
            .controller
            .send(&fx.chat_id, "two", None, false)
            .await
            .unwrap_err();
        assert!(err.is_busy());

        // The user message is visible while the call is pending.
        assert_eq!(history(&fx).await, vec![Message::user("one", None)]);

        fx.backend.release();
        assert_eq!(first.await.unwrap().unwrap(), SendOutcome::Replied);
        assert!(!fx.controller.is_busy(&fx.chat_id));
        assert_eq!(history(&fx).await.len(), 2);
    }

    #[tokio::test]
    async fn test_submit_clears_draft_only_after_send() {
        let fx = fixture(Some("gemini-2.5-pro"), ScriptedBackend::replying("ok")).await;

        let mut draft = PendingInput::default();
        assert_eq!(
            fx.controller.submit(&fx.chat_id, &mut draft).await.unwrap(),
            SendOutcome::Skipped
        );

        draft.text = "hello".into();
        draft.attach_image(ImageAttachment::new("/x.png", "image/png"));
        assert!(draft.multimodal);

        fx.controller.submit(&fx.chat_id, &mut draft).await.unwrap();
        assert_eq!(draft, PendingInput::default());
    }

    #[tokio::test]
    async fn test_rejected_submit_keeps_draft() {
        let fx = fixture(None, ScriptedBackend::replying("ok")).await;

        let mut draft = PendingInput {
            text: "keep me".into(),
            ..Default::default()
        };
        assert!(fx.controller.submit(&fx.chat_id, &mut draft).await.is_err());
        assert_eq!(draft.text, "keep me");
    }
}
