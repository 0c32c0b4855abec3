//! API response types

use serde::Serialize;

/// Acknowledgement returned for every accepted update
#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub ok: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
