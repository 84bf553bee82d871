//! Bulk hydration: reconstructing log contents from the block store.
//!
//! All reconstruction paths funnel through [`fetch_all`], a breadth-first
//! walk backwards through `next` and `refs` links with a bounded entry
//! count, an exclusion set that is never re-fetched, bounded fetch
//! parallelism, and a wall-clock budget. On budget expiry the partial set
//! fetched so far is returned; every entry in it is complete and valid.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use driftwood_store::{BlockStore, Codec, StoreError, ipld_to_json, json_to_ipld};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entry::Entry;
use crate::error::LogError;

/// Default fetch parallelism.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Progress callback: `(hash, entry, parent hash, depth)`.
pub type ProgressFn = Arc<dyn Fn(&str, &Entry, Option<&str>, usize) + Send + Sync>;

/// Bounds and hooks for hydration fetches.
#[derive(Clone, Default)]
pub struct FetchOptions {
    /// Maximum number of entries to fetch. `None` fetches everything
    /// reachable.
    pub length: Option<usize>,
    /// Hashes already held by the caller; never fetched.
    pub exclude: Vec<String>,
    /// Wall-clock budget for the whole fetch.
    pub timeout: Option<Duration>,
    /// Fetches in flight at once. Zero means [`DEFAULT_CONCURRENCY`].
    pub concurrency: usize,
    /// Invoked once per fetched entry.
    pub on_progress: Option<ProgressFn>,
}

/// The manifest block a log is published under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogManifest {
    /// Log identifier.
    pub id: String,
    /// Head hashes, sorted with the log's configured sort, descending.
    pub heads: Vec<String>,
}

/// Everything a log constructor needs from a hydration pass.
pub struct HydratedLog {
    /// Log identifier, when the source carries one.
    pub log_id: Option<String>,
    /// Fetched entries, roots first.
    pub entries: Vec<Entry>,
    /// Head entries, when the source names them.
    pub heads: Vec<Entry>,
}

/// Fetch `roots` and their ancestry from the store, breadth first.
///
/// Hashes listed in `opts.exclude` are treated as already present. Links
/// that resolve to nothing are skipped: a log may be partial, and its
/// missing parents are exactly its tail hashes.
pub async fn fetch_all(
    store: &dyn BlockStore,
    roots: &[String],
    opts: &FetchOptions,
) -> Result<Vec<Entry>, LogError> {
    let concurrency = if opts.concurrency == 0 {
        DEFAULT_CONCURRENCY
    } else {
        opts.concurrency
    };
    let deadline = opts.timeout.map(|t| tokio::time::Instant::now() + t);

    let mut seen: HashSet<String> = opts.exclude.iter().cloned().collect();
    let mut frontier: Vec<(String, Option<String>, usize)> = Vec::new();
    for hash in roots {
        if seen.insert(hash.clone()) {
            frontier.push((hash.clone(), None, 0));
        }
    }

    let mut result: Vec<Entry> = Vec::new();

    while !frontier.is_empty() {
        if let Some(limit) = opts.length
            && result.len() >= limit
        {
            break;
        }
        if let Some(deadline) = deadline
            && tokio::time::Instant::now() >= deadline
        {
            debug!(
                fetched = result.len(),
                "hydration deadline reached, returning partial set"
            );
            break;
        }

        let wave = std::mem::take(&mut frontier);
        let fetched: Vec<Option<(Entry, Option<String>, usize)>> = stream::iter(wave)
            .map(|(hash, parent, depth)| async move {
                match Entry::from_multihash(store, &hash).await {
                    Ok(entry) => Ok(Some((entry, parent, depth))),
                    Err(LogError::Store(StoreError::NotFound(_))) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .buffer_unordered(concurrency)
            .try_collect()
            .await?;

        for (entry, parent, depth) in fetched.into_iter().flatten() {
            if let Some(limit) = opts.length
                && result.len() >= limit
            {
                break;
            }
            if let Some(on_progress) = &opts.on_progress {
                on_progress(&entry.hash, &entry, parent.as_deref(), depth);
            }
            for link in entry.next.iter().chain(entry.refs.iter()) {
                if seen.insert(link.clone()) {
                    frontier.push((link.clone(), Some(entry.hash.clone()), depth + 1));
                }
            }
            result.push(entry);
        }
    }

    debug!(fetched = result.len(), roots = roots.len(), "hydrated entries");
    Ok(result)
}

/// Store a log manifest under the modern codec, returning its address.
pub async fn write_manifest(
    store: &dyn BlockStore,
    manifest: &LogManifest,
    pin: bool,
) -> Result<String, LogError> {
    let value = serde_json::to_value(manifest)?;
    Ok(store.write(Codec::DagCbor, &json_to_ipld(&value), pin).await?)
}

/// Load the manifest under `hash` and fetch the log it names.
pub async fn log_from_multihash(
    store: &dyn BlockStore,
    hash: &str,
    opts: &FetchOptions,
) -> Result<HydratedLog, LogError> {
    let ipld = store.read(hash).await?;
    let manifest: LogManifest = serde_json::from_value(ipld_to_json(&ipld)?)?;

    let entries = fetch_all(store, &manifest.heads, opts).await?;
    let heads: Vec<Entry> = manifest
        .heads
        .iter()
        .filter_map(|h| entries.iter().find(|e| &e.hash == h).cloned())
        .collect();

    Ok(HydratedLog {
        log_id: Some(manifest.id),
        entries,
        heads,
    })
}

/// Fetch a log from bare entry hashes. Heads are left for the constructor
/// to recompute.
pub async fn log_from_entry_hash(
    store: &dyn BlockStore,
    hashes: &[String],
    opts: &FetchOptions,
) -> Result<HydratedLog, LogError> {
    let entries = fetch_all(store, hashes, opts).await?;
    Ok(HydratedLog {
        log_id: None,
        entries,
        heads: Vec::new(),
    })
}

/// Fetch the ancestry of already-held source entries.
pub async fn log_from_entry(
    store: &dyn BlockStore,
    sources: &[Entry],
    opts: &FetchOptions,
) -> Result<HydratedLog, LogError> {
    let mut roots: Vec<String> = Vec::new();
    for source in sources {
        for link in source.next.iter().chain(source.refs.iter()) {
            if !roots.contains(link) {
                roots.push(link.clone());
            }
        }
    }

    let mut fetch_opts = opts.clone();
    fetch_opts
        .exclude
        .extend(sources.iter().map(|e| e.hash.clone()));
    if let Some(length) = opts.length {
        fetch_opts.length = Some(length.saturating_sub(sources.len()));
    }

    let fetched = fetch_all(store, &roots, &fetch_opts).await?;

    let mut entries: Vec<Entry> = sources.to_vec();
    entries.extend(fetched);

    Ok(HydratedLog {
        log_id: sources.first().map(|e| e.id.clone()),
        entries,
        heads: Vec::new(),
    })
}
