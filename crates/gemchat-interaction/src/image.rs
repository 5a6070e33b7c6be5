//! Image attachments: selection from a path and inline encoding.
//!
//! Encoding is the first of the two multimodal phases; the result is handed
//! to [`ModelClient::send_multimodal_turn`](crate::ModelClient::send_multimodal_turn).

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;

use gemchat_core::conversation::ImageAttachment;
use gemchat_core::generation::{InlineImage, RemoteCallError};
use gemchat_core::{GemchatError, Result};

/// Builds an attachment for a local file, rejecting non-image types.
pub fn attachment_from_path(path: impl AsRef<Path>) -> Result<ImageAttachment> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(GemchatError::validation(format!(
            "Image file not found: {}",
            path.display()
        )));
    }

    let mime_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string();
    if !mime_type.starts_with("image/") {
        return Err(GemchatError::validation(format!(
            "Not an image file ({mime_type}): {}",
            path.display()
        )));
    }

    Ok(ImageAttachment::new(path.to_string_lossy(), mime_type))
}

/// Reads the attachment and encodes it as base64 inline data.
pub async fn encode_image(
    attachment: &ImageAttachment,
) -> std::result::Result<InlineImage, RemoteCallError> {
    let bytes = tokio::fs::read(&attachment.path)
        .await
        .map_err(|e| RemoteCallError::Image(format!("{}: {}", attachment.path, e)))?;

    tracing::debug!(
        "[image] Encoded {} ({} bytes, {})",
        attachment.file_name(),
        bytes.len(),
        attachment.mime_type
    );

    Ok(InlineImage {
        mime_type: attachment.mime_type.clone(),
        data: BASE64_STANDARD.encode(bytes),
    })
}
