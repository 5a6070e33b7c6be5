//! Data Transfer Objects (DTOs) for persistence.
//!
//! These DTOs are the versioned on-disk schema. They stay private to the
//! infrastructure layer; repositories convert them to domain types through
//! `version-migrate`.

mod conversation;
mod credentials;

pub use conversation::{create_conversation_migrator, wrap_legacy_archive};
pub use credentials::create_credentials_migrator;
