//! Error types for kafka-types crate.

use thiserror::Error;

/// Errors raised by catalog lookups and rendering.
#[derive(Error, Debug)]
pub enum KafkaTypesError {
    #[error("Message type not found: {0}")]
    MessageTypeNotFound(String),

    #[error("Failed to render decoded message: {0}")]
    Render(#[from] serde_json::Error),
}

/// Result type alias for kafka-types operations.
pub type Result<T> = std::result::Result<T, KafkaTypesError>;
