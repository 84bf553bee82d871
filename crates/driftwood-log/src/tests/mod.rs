//! Tests for the log crate.

mod append_tests;
mod heads_tails_tests;

use std::sync::Arc;

use driftwood_store::BlockDb;
use driftwood_types::{Identity, Keystore};

use crate::log::{Log, LogOptions};

/// Deterministic (keystore, identity) pair from a seed.
fn test_identity(seed: u8) -> (Arc<Keystore>, Identity) {
    let keystore = Arc::new(Keystore::new());
    let identity = keystore.identity_from_seed(&format!("user{seed}"), [seed; 32]);
    (keystore, identity)
}

/// In-memory block store shared by the logs under test.
fn test_store() -> Arc<BlockDb> {
    Arc::new(BlockDb::in_memory())
}

/// A log over `store` authored by the seeded identity.
fn test_log(store: &Arc<BlockDb>, seed: u8, id: &str) -> Log {
    let (keystore, identity) = test_identity(seed);
    Log::new(
        store.clone(),
        keystore,
        identity,
        LogOptions::with_id(id),
    )
    .unwrap()
}
