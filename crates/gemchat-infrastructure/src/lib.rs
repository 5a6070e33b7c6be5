//! Local persistence for gemchat: JSON key-value documents, versioned DTOs,
//! file-backed repositories and `config.toml`.

pub mod config_service;
pub mod conversation_repository;
pub mod credential_repository;
pub mod dto;
pub mod paths;
pub mod storage;

pub use crate::config_service::ConfigService;
pub use crate::conversation_repository::FileConversationRepository;
pub use crate::credential_repository::FileCredentialRepository;
pub use crate::paths::GemchatPaths;
