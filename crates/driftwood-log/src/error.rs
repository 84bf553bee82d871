//! Error types for the log crate.

use driftwood_store::StoreError;
use driftwood_types::IdentityError;

/// Errors that can occur during log operations.
///
/// Wording of the data-dependent variants is part of the public surface and
/// kept stable.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// Entry creation was asked for without a log id.
    #[error("Entry requires an id")]
    EntryIdRequired,

    /// An entry is missing fields required for content addressing.
    #[error("Invalid object format, cannot generate entry hash")]
    InvalidEntryFormat,

    /// The access controller rejected a write.
    #[error("Could not append entry, key \"{key}\" is not allowed to write to the log")]
    NotAllowed {
        /// The rejected writer's key id.
        key: String,
    },

    /// Signature verification failed for an entry.
    #[error("Could not validate signature \"{sig}\" for entry \"{hash}\" and key \"{key}\"")]
    InvalidSignature {
        /// The offending signature, hex.
        sig: String,
        /// The entry's content address.
        hash: String,
        /// The key the signature was checked against.
        key: String,
    },

    /// An entry's recorded hash does not match its canonical encoding.
    #[error("entry hash {actual} does not match its content address {expected}")]
    HashMismatch {
        /// Hash carried by the entry.
        actual: String,
        /// Address derived from the canonical encoding.
        expected: String,
    },

    /// Two unauthored entries (zero clock time, same clock id) were compared.
    /// Indicates forged or corrupt data; the operation must abort.
    #[error("cannot order two entries with zero clock time and identical clock id \"{id}\"")]
    ZeroTimeCollision {
        /// The shared clock id.
        id: String,
    },

    /// Block store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Identity layer failure.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for LogError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
