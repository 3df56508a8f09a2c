//! Error types for tw-carousel

use thiserror::Error;

/// Errors from the track source, image loader and marker store
#[derive(Debug, Error)]
pub enum CarouselError {
    /// Transport failure talking to the track server
    #[error("HTTP error: {0}")]
    Http(String),

    /// Non-success status other than not-found
    #[error("Server returned status {0}")]
    Status(u16),

    /// Body or persisted file could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for CarouselError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CarouselError::Decode(err.to_string())
        } else {
            CarouselError::Http(err.to_string())
        }
    }
}

/// Result type alias for carousel operations
pub type Result<T> = std::result::Result<T, CarouselError>;
