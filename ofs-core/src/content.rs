//! Transport-safe text encoding for file content.
//!
//! JSON strings cannot hold arbitrary bytes, so file bodies travel as
//! standard padded base64 in the `data_base64` field.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::error::ContentError;

/// Field name used for encoded content in requests and responses.
pub const CONTENT_FIELD: &str = "data_base64";

pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode(text: &str) -> Result<Vec<u8>, ContentError> {
    Ok(STANDARD.decode(text.trim())?)
}
