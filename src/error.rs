//! Error types for the dispute chat protocol layer.

use thiserror::Error;

use crate::protocol::schema::SchemaError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Structural or semantic content failure, with field paths.
    #[error("Schema validation failed: {0}")]
    Schema(#[from] SchemaError),

    /// Payload is not JSON, or carries a foreign authority where ours is required.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Missing thread or counterparty. A normal, non-exceptional outcome.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network, registration, or permission failure in the underlying transport.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Missing or invalid identity / environment parameters.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for outcomes that should surface as `success:false` without an
    /// error payload at the tool boundary.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
