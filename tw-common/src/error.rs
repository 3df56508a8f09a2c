//! Common error types for trackwall

use thiserror::Error;

/// Common result type for trackwall operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the server and the carousel client
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Value could not be parsed from its wire form
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
