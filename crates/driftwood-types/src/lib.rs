//! Shared types for Driftwood.
//!
//! This crate defines the [`LamportClock`] used to order log entries and
//! the identity layer ([`Identity`], [`IdentityProvider`], [`Keystore`])
//! used to sign and verify them.

pub mod identity;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

pub use identity::{Identity, IdentityError, IdentityProvider, IdentitySignatures, Keystore};

// ---------------------------------------------------------------------------
// Lamport clock
// ---------------------------------------------------------------------------

/// A Lamport logical clock: an author id paired with a logical time.
///
/// Clocks are value types — every update produces a new clock, and no
/// mutable clock state is ever shared between entries. The total order is
/// lexicographic on `(time, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LamportClock {
    /// Author identifier, typically the author's public key.
    pub id: String,
    /// Logical time. Starts at zero and only ever grows.
    pub time: u64,
}

impl LamportClock {
    /// Create a clock at time zero.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            time: 0,
        }
    }

    /// Create a clock at an explicit time.
    pub fn with_time(id: impl Into<String>, time: u64) -> Self {
        Self {
            id: id.into(),
            time,
        }
    }

    /// Return a new clock advanced by one.
    pub fn tick(&self) -> Self {
        Self {
            id: self.id.clone(),
            time: self.time + 1,
        }
    }

    /// Merge with another clock, keeping the larger time and our id.
    pub fn merge(&self, other: &LamportClock) -> Self {
        Self {
            id: self.id.clone(),
            time: self.time.max(other.time),
        }
    }

    /// Total order on `(time, id)`.
    pub fn compare(a: &LamportClock, b: &LamportClock) -> Ordering {
        a.time.cmp(&b.time).then_with(|| a.id.cmp(&b.id))
    }
}

impl PartialOrd for LamportClock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LamportClock {
    fn cmp(&self, other: &Self) -> Ordering {
        Self::compare(self, other)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
