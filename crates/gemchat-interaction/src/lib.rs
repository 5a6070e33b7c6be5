//! Remote generation for gemchat: the model client, the Gemini REST
//! backend and image encoding.

pub mod gemini_api_client;
pub mod image;
pub mod model_client;

pub use gemini_api_client::GeminiApiClient;
pub use image::{attachment_from_path, encode_image};
pub use model_client::{BackendConnector, GeminiConnector, ModelClient, ModelHandle};
