//! Conversion between local image files and the API's inline payloads.

use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};

use crate::error::{Result, StudioError};

const FALLBACK_MIME: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl EncodedImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    /// `generateContent` part carrying the image inline.
    pub fn inline_part(&self) -> Value {
        json!({
            "inlineData": {
                "mimeType": self.mime_type,
                "data": self.base64(),
            }
        })
    }

    /// Image field of a `predictLongRunning` instance.
    pub fn prediction_image(&self) -> Value {
        json!({
            "bytesBase64Encoded": self.base64(),
            "mimeType": self.mime_type,
        })
    }
}

pub fn encode_binary_for_transfer(path: &Path) -> Result<EncodedImage> {
    let bytes = fs::read(path).map_err(|source| StudioError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mime_type = mime_for_path(path)
        .or_else(|| sniff_image_mime(&bytes))
        .unwrap_or_else(|| FALLBACK_MIME.to_string());
    Ok(EncodedImage { bytes, mime_type })
}

pub fn mime_for_path(path: &Path) -> Option<String> {
    mime_guess::from_path(path)
        .first()
        .map(|mime| mime.essence_str().to_string())
}

pub fn sniff_image_mime(bytes: &[u8]) -> Option<String> {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type().to_string())
}

/// Decodes the inline payload of one response part.
pub fn decode_inline_result(part: &Value) -> Result<Vec<u8>> {
    let inline = part
        .get("inlineData")
        .or_else(|| part.get("inline_data"))
        .and_then(Value::as_object)
        .ok_or_else(|| StudioError::malformed("response part has no inline data"))?;
    let data = inline
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| StudioError::malformed("inline data has no payload"))?;
    BASE64
        .decode(data.as_bytes())
        .map_err(|err| StudioError::malformed(format!("inline payload is not valid base64: {err}")))
}

pub fn inline_mime_type(part: &Value) -> Option<String> {
    let inline = part.get("inlineData").or_else(|| part.get("inline_data"))?;
    inline
        .get("mimeType")
        .or_else(|| inline.get("mime_type"))
        .and_then(Value::as_str)
        .map(str::to_string)
}
