//! Credentials DTOs
//!
//! ## Version History
//! - **1.0.0**: API key and model name

use serde::{Deserialize, Serialize};
use version_migrate::{FromDomain, IntoDomain, Versioned};

use gemchat_core::credentials::Credentials;

/// Credentials DTO V1.0.0
#[derive(Clone, Serialize, Deserialize, Versioned)]
#[versioned(version = "1.0.0")]
#[serde(rename_all = "camelCase")]
pub struct CredentialsV1_0_0 {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model_name: String,
}

impl IntoDomain<Credentials> for CredentialsV1_0_0 {
    fn into_domain(self) -> Credentials {
        Credentials::new(self.api_key, self.model_name)
    }
}

impl FromDomain<Credentials> for CredentialsV1_0_0 {
    fn from_domain(credentials: Credentials) -> Self {
        CredentialsV1_0_0 {
            api_key: credentials.api_key,
            model_name: credentials.model_name,
        }
    }
}

/// Creates a Migrator for stored credentials.
pub fn create_credentials_migrator() -> version_migrate::Migrator {
    version_migrate::migrator!("credentials" => [
        CredentialsV1_0_0,
        Credentials
    ], save = true)
    .expect("Failed to create credentials migrator")
}
