//! Domain layer of gemchat: conversations, credentials, the generation
//! backend interface and the shared error type.

pub mod config;
pub mod conversation;
pub mod credentials;
pub mod error;
pub mod generation;

// Re-export common error type
pub use error::{GemchatError, Result};
