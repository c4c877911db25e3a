//! Image encoding: normalised PNG on disk → base64 `ImageData` for the
//! multimodal request body.
//!
//! `detail: "high"` keeps GPT-class models from downscaling the page to a
//! single low-resolution tile, which loses handwriting in narrow columns.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use std::path::Path;
use tracing::debug;

/// MIME type for an image file, from its extension. Defaults to PNG, which
/// is what the normaliser writes.
pub fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "image/png",
    }
}

/// Encode raw image bytes as an `ImageData` attachment.
pub fn encode_bytes(bytes: &[u8], mime: &str) -> ImageData {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded image → {} bytes base64", b64.len());
    ImageData::new(b64, mime).with_detail("high")
}

/// Read an image file and encode it for the model.
pub async fn encode_file(path: &Path) -> std::io::Result<ImageData> {
    let bytes = tokio::fs::read(path).await?;
    Ok(encode_bytes(&bytes, mime_for(path)))
}
