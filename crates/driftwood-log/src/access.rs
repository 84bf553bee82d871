//! Write-access control.
//!
//! The log consults an [`AccessController`] before admitting an entry,
//! both on local `append` and for every new entry during `join`. Policy
//! stays outside the core: the controller is a single-operation capability.

use std::collections::HashSet;

use driftwood_types::IdentityProvider;

use crate::entry::Entry;
use crate::error::LogError;

/// Decides whether an entry may be written to the log.
#[async_trait::async_trait]
pub trait AccessController: Send + Sync {
    /// Whether `entry` is allowed into the log.
    async fn can_append(
        &self,
        entry: &Entry,
        provider: &dyn IdentityProvider,
    ) -> Result<bool, LogError>;
}

/// Access controller that permits every writer. The default.
#[derive(Debug, Default)]
pub struct PermissiveAccess;

#[async_trait::async_trait]
impl AccessController for PermissiveAccess {
    async fn can_append(
        &self,
        _entry: &Entry,
        _provider: &dyn IdentityProvider,
    ) -> Result<bool, LogError> {
        Ok(true)
    }
}

/// Access controller backed by a set of authorized writer ids.
///
/// An entry is admitted when its author id (the identity id when present,
/// otherwise the signing key) is listed, or when the list contains the
/// `"*"` wildcard.
#[derive(Debug)]
pub struct AllowlistAccess {
    allowed: HashSet<String>,
}

impl AllowlistAccess {
    /// Build an allow-list from writer ids.
    pub fn new(keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            allowed: keys.into_iter().collect(),
        }
    }
}

#[async_trait::async_trait]
impl AccessController for AllowlistAccess {
    async fn can_append(
        &self,
        entry: &Entry,
        _provider: &dyn IdentityProvider,
    ) -> Result<bool, LogError> {
        if self.allowed.contains("*") {
            return Ok(true);
        }
        Ok(self.allowed.contains(entry.author_id()))
    }
}
