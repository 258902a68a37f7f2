//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Undecodable Shift_JIS byte sequence: {bytes}")]
    Decode { bytes: String },

    #[error("Text cannot be represented in Shift_JIS: {0}")]
    Encode(String),
}

impl CommonError {
    /// Build a decode error carrying a hex rendering of the offending bytes
    pub fn decode(bytes: &[u8]) -> Self {
        let hex: Vec<String> = bytes.iter().map(|b| format!("{:02X}", b)).collect();
        Self::Decode {
            bytes: hex.join(" "),
        }
    }
}
