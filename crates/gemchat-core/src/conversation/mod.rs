//! Conversation domain module.
//!
//! # Module Structure
//!
//! - `model`: `Conversation` and its `GenerationConfig`
//! - `message`: `Message`, `Sender` and `ImageAttachment`
//! - `repository`: persistence trait and the `ConversationArchive` it stores
//! - `store`: `ConversationStore`, the in-memory aggregate with write-through
//!
//! # Usage
//!
//! ```ignore
//! use gemchat_core::conversation::{ConversationStore, Message, GenerationSetting};
//! ```

mod message;
mod model;
mod repository;
mod store;

pub use message::{ImageAttachment, Message, Sender};
pub use model::{Conversation, GenerationConfig, GenerationSetting};
pub use repository::{ConversationArchive, ConversationRepository};
pub use store::ConversationStore;
