//! API credentials, model selection and the capability heuristic.

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Model used when setup does not name one.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Models offered by the setup prompt, in display order.
pub const KNOWN_MODELS: &[&str] = &["gemini-2.0-flash", "gemini-2.5-pro"];

/// Credentials captured by the setup flow.
///
/// Read-only once persisted; only an explicit reset replaces them.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub api_key: String,
    pub model_name: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model_name: model_name.into(),
        }
    }

    pub fn capabilities(&self) -> BTreeSet<ModelCapability> {
        capabilities_of(&self.model_name)
    }
}

// Keeps the key out of logs and panic messages.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("model_name", &self.model_name)
            .finish()
    }
}

/// What kind of prompt a model accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelCapability {
    Text,
    Vision,
}

/// Derives the capability set from a model name.
///
/// Names containing `vision`, and the `gemini-2.0-flash` baseline, accept
/// images. Everything else is text only. This is a name-based guess, not a
/// query against the remote model catalogue.
pub fn capabilities_of(model_name: &str) -> BTreeSet<ModelCapability> {
    let mut caps = BTreeSet::from([ModelCapability::Text]);
    if model_name.contains("vision") || model_name == DEFAULT_MODEL {
        caps.insert(ModelCapability::Vision);
    }
    caps
}

/// Short label for a model name: drops the `models/` and `gemini-` prefixes.
pub fn display_model_name(model_name: &str) -> &str {
    let name = model_name.strip_prefix("models/").unwrap_or(model_name);
    name.strip_prefix("gemini-").unwrap_or(name)
}

/// Durable storage for the configured credentials.
///
/// Implementations must keep the key out of logs and should restrict file
/// permissions where the platform allows it.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    /// Returns the stored credentials, or `None` when nothing usable is stored.
    async fn load(&self) -> Result<Option<Credentials>>;

    async fn save(&self, credentials: &Credentials) -> Result<()>;

    /// Removes stored credentials. Clearing an empty store succeeds.
    async fn clear(&self) -> Result<()>;
}
