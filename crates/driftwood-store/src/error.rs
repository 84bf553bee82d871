//! Error types for the block store crate.

/// Errors that can occur while encoding, addressing, or storing blocks.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No block exists under the given content address.
    #[error("block not found: {0}")]
    NotFound(String),

    /// A content address string could not be parsed.
    #[error("invalid content address: {0}")]
    InvalidCid(String),

    /// IPLD encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// A value cannot be represented in the target format.
    #[error("unsupported value: {0}")]
    UnsupportedValue(String),

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<postcard::Error> for StoreError {
    fn from(e: postcard::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
