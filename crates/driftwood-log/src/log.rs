//! The log: an append-only, signed, content-addressed Merkle DAG.
//!
//! A [`Log`] holds materialized entries and the indices needed to extend
//! and merge the DAG. Mutation happens only through [`Log::append`] and
//! [`Log::join`]; everything else is a view. Two logs with the same
//! contents present the same `values()` regardless of how the contents
//! arrived — `join` is commutative, associative, and idempotent.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use driftwood_store::BlockStore;
use driftwood_types::{Identity, IdentityProvider, LamportClock};
use futures::stream::{self, TryStreamExt};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::access::{AccessController, PermissiveAccess};
use crate::entry::{CreateOpts, Entry};
use crate::error::LogError;
use crate::hydrate::{self, FetchOptions, LogManifest};
use crate::sorting::{self, SortFn, sort_entries};

/// Default bounded parallelism for join-time verification.
pub const DEFAULT_JOIN_CONCURRENCY: usize = 16;

/// Construction-time options for [`Log::new`].
#[derive(Clone, Default)]
pub struct LogOptions {
    /// Log identifier. Defaults to the identity's id.
    pub id: Option<String>,
    /// Write-access controller. Defaults to [`PermissiveAccess`].
    pub access: Option<Arc<dyn AccessController>>,
    /// User-supplied sort; always wrapped in the zero-time guard.
    pub sort_fn: Option<SortFn>,
    /// Seed entries.
    pub entries: Vec<Entry>,
    /// Seed heads. Recomputed from `entries` when empty.
    pub heads: Vec<Entry>,
    /// Starting clock.
    pub clock: Option<LamportClock>,
    /// Verification parallelism during join.
    pub join_concurrency: Option<usize>,
}

impl LogOptions {
    /// Options with just a log id set.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }
}

/// Iteration window for [`Log::iter`].
#[derive(Clone, Default)]
pub struct IterOptions {
    /// Exclusive lower bound: stop at this hash and drop it.
    pub gt: Option<String>,
    /// Inclusive lower bound: stop at this hash and keep it.
    pub gte: Option<String>,
    /// Exclusive upper bounds: start from these entries' parents.
    pub lt: Vec<String>,
    /// Inclusive upper bounds: start from these entries.
    pub lte: Vec<String>,
    /// Maximum number of entries yielded.
    pub amount: Option<usize>,
}

/// A full materialized copy of a log: heads plus every value.
#[derive(Debug, Clone, PartialEq)]
pub struct LogSnapshot {
    /// Log identifier.
    pub id: String,
    /// Head entries, sort-descending.
    pub heads: Vec<Entry>,
    /// All entries, sort-ascending.
    pub values: Vec<Entry>,
}

/// An append-only, signed, content-addressed CRDT log.
#[derive(Clone)]
pub struct Log {
    id: String,
    clock: LamportClock,
    sort_fn: SortFn,
    store: Arc<dyn BlockStore>,
    provider: Arc<dyn IdentityProvider>,
    identity: Identity,
    access: Arc<dyn AccessController>,
    /// hash → materialized entry.
    entry_index: HashMap<String, Entry>,
    /// hash → entry, restricted to current heads.
    heads_index: HashMap<String, Entry>,
    /// parent hash → child hash; last writer wins.
    nexts_index: HashMap<String, String>,
    /// Insertion-ordered hash → next[]. Canonical length counter.
    hash_index: IndexMap<String, Vec<String>>,
    join_concurrency: usize,
}

impl Log {
    /// Create a log, optionally seeded with entries and heads.
    pub fn new(
        store: Arc<dyn BlockStore>,
        provider: Arc<dyn IdentityProvider>,
        identity: Identity,
        opts: LogOptions,
    ) -> Result<Self, LogError> {
        let id = opts.id.unwrap_or_else(|| identity.id.clone());
        let sort_fn = match opts.sort_fn {
            Some(f) => sorting::no_zeroes_sort(f),
            None => sorting::default_sort(),
        };
        let access: Arc<dyn AccessController> =
            opts.access.unwrap_or_else(|| Arc::new(PermissiveAccess));

        let mut entry_index = HashMap::new();
        let mut hash_index = IndexMap::new();
        let mut nexts_index = HashMap::new();
        for entry in &opts.entries {
            if !hash_index.contains_key(&entry.hash) {
                hash_index.insert(entry.hash.clone(), entry.next.clone());
                entry_index.insert(entry.hash.clone(), entry.clone());
                for parent in &entry.next {
                    nexts_index.insert(parent.clone(), entry.hash.clone());
                }
            }
        }

        let mut heads = if opts.heads.is_empty() {
            Self::find_heads(opts.entries.iter())
        } else {
            opts.heads
        };
        let mut heads_index = HashMap::new();
        heads.retain(|h| heads_index.insert(h.hash.clone(), h.clone()).is_none());

        let seed_time = opts.clock.map(|c| c.time).unwrap_or(0);
        let max_time = heads
            .iter()
            .map(|h| h.clock.time)
            .fold(seed_time, u64::max);
        let clock = LamportClock::with_time(identity.public_key.clone(), max_time);

        Ok(Self {
            id,
            clock,
            sort_fn,
            store,
            provider,
            identity,
            access,
            entry_index,
            heads_index,
            nexts_index,
            hash_index,
            join_concurrency: opts
                .join_concurrency
                .unwrap_or(DEFAULT_JOIN_CONCURRENCY),
        })
    }

    /// The log's identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The log's current clock.
    pub fn clock(&self) -> &LamportClock {
        &self.clock
    }

    /// Number of entries this instance knows about.
    pub fn len(&self) -> usize {
        self.hash_index.len()
    }

    /// Whether the log has no entries.
    pub fn is_empty(&self) -> bool {
        self.hash_index.is_empty()
    }

    /// Whether `hash` is part of this log.
    pub fn has(&self, hash: &str) -> bool {
        self.hash_index.contains_key(hash)
    }

    /// Fetch an entry by hash, from the local index or the store.
    pub async fn get(&self, hash: &str) -> Result<Option<Entry>, LogError> {
        if let Some(entry) = self.entry_index.get(hash) {
            return Ok(Some(entry.clone()));
        }
        match Entry::from_multihash(self.store.as_ref(), hash).await {
            Ok(entry) => Ok(Some(entry)),
            Err(LogError::Store(driftwood_store::StoreError::NotFound(_))) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// All entries, sorted ascending with the configured sort.
    pub async fn values(&self) -> Result<Vec<Entry>, LogError> {
        let mut entries = Vec::with_capacity(self.hash_index.len());
        for hash in self.hash_index.keys() {
            if let Some(entry) = self.get(hash).await? {
                entries.push(entry);
            }
        }
        sort_entries(&mut entries, &self.sort_fn)?;
        Ok(entries)
    }

    /// Current heads, sorted descending with the configured sort.
    pub fn heads(&self) -> Result<Vec<Entry>, LogError> {
        let mut heads: Vec<Entry> = self.heads_index.values().cloned().collect();
        sort_entries(&mut heads, &self.sort_fn)?;
        heads.reverse();
        Ok(heads)
    }

    /// Entries whose parents are not all present in this log.
    pub async fn tails(&self) -> Result<Vec<Entry>, LogError> {
        Ok(Self::find_tails(&self.values().await?))
    }

    /// Parent hashes referenced by the log but absent from it.
    pub async fn tail_hashes(&self) -> Result<Vec<String>, LogError> {
        Ok(Self::find_tail_hashes(&self.values().await?))
    }

    /// Append a payload to the log as a new signed entry.
    ///
    /// `pointer_count` bounds the skip-list references attached to the
    /// entry; the new entry's `next` always covers every current head.
    pub async fn append(
        &mut self,
        payload: Value,
        pointer_count: usize,
        pin: bool,
    ) -> Result<Entry, LogError> {
        // Advance the clock past every known head.
        let heads = self.heads()?;
        let new_time = heads
            .iter()
            .map(|h| h.clock.time)
            .fold(self.clock.time, u64::max)
            + 1;
        self.clock = LamportClock::with_time(self.clock.id.clone(), new_time);

        // Reachable ancestry for reference selection.
        let amount = pointer_count.max(heads.len());
        let traversed = self.traverse(&heads, Some(amount), None).await?;
        let all: Vec<&Entry> = traversed.values().collect();

        // Skip-list references at power-of-two distances.
        let mut refs: Vec<String> = Vec::new();
        if !all.is_empty() {
            let max_distance = pointer_count.min(all.len());
            let mut distance = 1;
            while distance <= max_distance {
                let entry = all[(distance - 1).min(all.len() - 1)];
                if !refs.contains(&entry.hash) {
                    refs.push(entry.hash.clone());
                }
                distance *= 2;
            }
            // When the log is shallower than the pointer budget, anchor the
            // deepest reachable entry.
            if all.len() < pointer_count {
                let deepest = all[all.len() - 1];
                if !refs.contains(&deepest.hash) {
                    refs.push(deepest.hash.clone());
                }
            }
        }

        // Next pointers cover the current heads, first-seen order.
        let mut next: Vec<String> = Vec::new();
        for head in &heads {
            if !next.contains(&head.hash) {
                next.push(head.hash.clone());
            }
        }

        // Causal parents are never repeated as shortcuts.
        refs.retain(|r| !next.contains(r));

        let entry = Entry::create(
            self.store.as_ref(),
            self.provider.as_ref(),
            &self.identity,
            &self.id,
            payload,
            &next,
            CreateOpts {
                clock: Some(self.clock.clone()),
                refs,
                pin,
            },
        )
        .await?;

        if !self
            .access
            .can_append(&entry, self.provider.as_ref())
            .await?
        {
            return Err(LogError::NotAllowed {
                key: self.identity.id.clone(),
            });
        }

        self.entry_index.insert(entry.hash.clone(), entry.clone());
        for parent in &next {
            self.nexts_index.insert(parent.clone(), entry.hash.clone());
        }
        self.heads_index.clear();
        self.heads_index.insert(entry.hash.clone(), entry.clone());
        self.hash_index.insert(entry.hash.clone(), next);

        debug!(
            hash = %entry.hash,
            time = entry.clock.time,
            length = self.hash_index.len(),
            "appended entry"
        );

        Ok(entry)
    }

    /// Merge another log into this one.
    ///
    /// Logs with different identifiers are never merged; the call is a
    /// no-op. Every entry new to this log is access-checked and
    /// signature-verified (with bounded parallelism) before any state is
    /// touched, so a failed join leaves the log unchanged.
    pub async fn join(&mut self, other: &Log) -> Result<(), LogError> {
        if other.id != self.id {
            return Ok(());
        }

        // Entries the other log has that we don't.
        let mut diff: Vec<Entry> = Vec::new();
        for hash in other.hash_index.keys() {
            if !self.hash_index.contains_key(hash)
                && let Some(entry) = other.get(hash).await?
            {
                diff.push(entry);
            }
        }

        // Verify everything new before mutating anything. The first
        // failure aborts the whole join.
        let provider = Arc::clone(&self.provider);
        let access = Arc::clone(&self.access);
        stream::iter(diff.iter().map(Ok::<_, LogError>))
            .try_for_each_concurrent(self.join_concurrency, |entry| {
                let provider = Arc::clone(&provider);
                let access = Arc::clone(&access);
                async move {
                    if !access.can_append(entry, provider.as_ref()).await? {
                        return Err(LogError::NotAllowed {
                            key: entry.author_id().to_string(),
                        });
                    }
                    Entry::verify(provider.as_ref(), entry).await
                }
            })
            .await?;

        // Fuse indices.
        let mut nexts_from_new: HashSet<String> = HashSet::new();
        for entry in &diff {
            for parent in &entry.next {
                nexts_from_new.insert(parent.clone());
                self.nexts_index
                    .insert(parent.clone(), entry.hash.clone());
            }
            self.hash_index
                .insert(entry.hash.clone(), entry.next.clone());
            self.entry_index.insert(entry.hash.clone(), entry.clone());
        }

        // Recompute heads: the union of both head sets, minus anything the
        // combined log references as a parent.
        let mut merged: HashMap<String, Entry> = self.heads_index.clone();
        for (hash, entry) in &other.heads_index {
            merged.entry(hash.clone()).or_insert_with(|| entry.clone());
        }
        merged.retain(|hash, _| !nexts_from_new.contains(hash));
        merged.retain(|hash, _| !self.nexts_index.contains_key(hash));

        let heads = Self::find_heads(merged.values());
        self.heads_index = heads
            .iter()
            .map(|e| (e.hash.clone(), e.clone()))
            .collect();

        // Witness the merged frontier.
        let max_time = heads.iter().map(|h| h.clock.time).max().unwrap_or(0);
        self.clock = LamportClock::with_time(
            self.clock.id.clone(),
            self.clock.time.max(max_time),
        );

        debug!(
            joined = diff.len(),
            heads = self.heads_index.len(),
            length = self.hash_index.len(),
            "joined log"
        );

        Ok(())
    }

    /// Walk the DAG backwards from `roots` in sorted order.
    ///
    /// Returns entries keyed by hash in emission order: a breadth-first
    /// walk that always takes the largest unvisited entry next, bounded by
    /// `amount` and stopping after emitting `end_hash`.
    pub async fn traverse(
        &self,
        roots: &[Entry],
        amount: Option<usize>,
        end_hash: Option<&str>,
    ) -> Result<IndexMap<String, Entry>, LogError> {
        let mut stack: Vec<Entry> = roots.to_vec();
        sort_entries(&mut stack, &self.sort_fn)?;
        stack.reverse();

        let mut scheduled: HashSet<String> = roots.iter().map(|e| e.hash.clone()).collect();
        let mut result: IndexMap<String, Entry> = IndexMap::new();
        let mut count = 0usize;

        while !stack.is_empty() {
            if let Some(limit) = amount
                && count >= limit
            {
                break;
            }

            let entry = stack.remove(0);
            count += 1;
            let hash = entry.hash.clone();
            let next = entry.next.clone();
            result.insert(hash.clone(), entry);

            if end_hash == Some(hash.as_str()) {
                break;
            }

            for parent_hash in &next {
                if let Some(parent) = self.get(parent_hash).await?
                    && scheduled.insert(parent.hash.clone())
                {
                    stack.push(parent);
                    sort_entries(&mut stack, &self.sort_fn)?;
                    stack.reverse();
                }
            }
        }

        Ok(result)
    }

    /// Iterate a window of the log in traversal (newest-first) order.
    pub async fn iter(
        &self,
        opts: IterOptions,
    ) -> Result<std::vec::IntoIter<Entry>, LogError> {
        if opts.amount == Some(0) {
            return Ok(Vec::new().into_iter());
        }

        let start: Vec<Entry> = if !opts.lte.is_empty() {
            self.resolve_hashes(&opts.lte).await?
        } else if !opts.lt.is_empty() {
            // Exclusive upper bound: begin at the bounds' parents.
            let mut parents: Vec<String> = Vec::new();
            for hash in &opts.lt {
                if let Some(entry) = self.get(hash).await? {
                    for parent in &entry.next {
                        if !parents.contains(parent) {
                            parents.push(parent.clone());
                        }
                    }
                }
            }
            self.resolve_hashes(&parents).await?
        } else {
            self.heads()?
        };

        let end_hash = opts.gte.clone().or_else(|| opts.gt.clone());
        let traverse_amount = if end_hash.is_some() { None } else { opts.amount };

        let traversed = self.traverse(&start, traverse_amount, end_hash.as_deref()).await?;
        let mut entries: Vec<Entry> = traversed.into_values().collect();

        if opts.gt.is_some() {
            entries.pop();
        }
        if (opts.gt.is_some() || opts.gte.is_some())
            && let Some(amount) = opts.amount
            && entries.len() > amount
        {
            entries = entries.split_off(entries.len() - amount);
        }

        Ok(entries.into_iter())
    }

    async fn resolve_hashes(&self, hashes: &[String]) -> Result<Vec<Entry>, LogError> {
        let mut entries = Vec::with_capacity(hashes.len());
        for hash in hashes {
            if let Some(entry) = self.get(hash).await? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// The log's manifest: its id and head hashes, sort-descending.
    pub fn to_json(&self) -> Result<LogManifest, LogError> {
        Ok(LogManifest {
            id: self.id.clone(),
            heads: self.heads()?.into_iter().map(|e| e.hash).collect(),
        })
    }

    /// Store the log's manifest, returning its content address.
    pub async fn to_multihash(&self, pin: bool) -> Result<String, LogError> {
        if self.hash_index.is_empty() {
            return Err(LogError::Serialization(
                "cannot serialize an empty log".to_string(),
            ));
        }
        hydrate::write_manifest(self.store.as_ref(), &self.to_json()?, pin).await
    }

    /// A full materialized copy: id, heads, and every value.
    pub async fn to_snapshot(&self) -> Result<LogSnapshot, LogError> {
        Ok(LogSnapshot {
            id: self.id.clone(),
            heads: self.heads()?,
            values: self.values().await?,
        })
    }

    /// Render the log as an indented tree, newest entries first.
    pub async fn to_display_string(
        &self,
        payload_mapping: Option<fn(&Value) -> String>,
    ) -> Result<String, LogError> {
        let values = self.values().await?;
        let mut lines = Vec::with_capacity(values.len());
        for entry in values.iter().rev() {
            let children = Entry::find_children(entry, &values);
            let depth = children.len();
            let mut line = "  ".repeat(depth.saturating_sub(1));
            if depth > 0 {
                line.push_str("└─");
            }
            line.push_str(&match payload_mapping {
                Some(f) => f(&entry.payload),
                None => entry.payload.to_string(),
            });
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }

    /// Reconstruct a log from a stored manifest hash.
    pub async fn from_multihash(
        store: Arc<dyn BlockStore>,
        provider: Arc<dyn IdentityProvider>,
        identity: Identity,
        hash: &str,
        fetch: FetchOptions,
        opts: LogOptions,
    ) -> Result<Self, LogError> {
        let hydrated = hydrate::log_from_multihash(store.as_ref(), hash, &fetch).await?;
        let mut opts = opts;
        opts.id = hydrated.log_id.or(opts.id);
        opts.entries = hydrated.entries;
        opts.heads = hydrated.heads;
        Self::new(store, provider, identity, opts)
    }

    /// Reconstruct a log from bare entry hashes.
    pub async fn from_entry_hash(
        store: Arc<dyn BlockStore>,
        provider: Arc<dyn IdentityProvider>,
        identity: Identity,
        hashes: &[String],
        fetch: FetchOptions,
        opts: LogOptions,
    ) -> Result<Self, LogError> {
        let hydrated = hydrate::log_from_entry_hash(store.as_ref(), hashes, &fetch).await?;
        let mut opts = opts;
        opts.entries = hydrated.entries;
        opts.heads = hydrated.heads;
        Self::new(store, provider, identity, opts)
    }

    /// Reconstruct a log from already-held entries plus their stored
    /// ancestry.
    pub async fn from_entry(
        store: Arc<dyn BlockStore>,
        provider: Arc<dyn IdentityProvider>,
        identity: Identity,
        sources: &[Entry],
        fetch: FetchOptions,
        opts: LogOptions,
    ) -> Result<Self, LogError> {
        let hydrated = hydrate::log_from_entry(store.as_ref(), sources, &fetch).await?;
        let mut opts = opts;
        opts.id = hydrated.log_id.or(opts.id);
        opts.entries = hydrated.entries;
        opts.heads = hydrated.heads;
        Self::new(store, provider, identity, opts)
    }

    /// Reconstruct a log from a snapshot, fetching whatever ancestry the
    /// snapshot doesn't carry.
    pub async fn from_json(
        store: Arc<dyn BlockStore>,
        provider: Arc<dyn IdentityProvider>,
        identity: Identity,
        snapshot: LogSnapshot,
        fetch: FetchOptions,
        opts: LogOptions,
    ) -> Result<Self, LogError> {
        let head_hashes: Vec<String> =
            snapshot.heads.iter().map(|e| e.hash.clone()).collect();

        let mut fetch_opts = fetch;
        fetch_opts
            .exclude
            .extend(snapshot.values.iter().map(|e| e.hash.clone()));

        let fetched = hydrate::fetch_all(store.as_ref(), &head_hashes, &fetch_opts).await?;

        let mut entries = snapshot.values;
        entries.extend(fetched);

        let mut opts = opts;
        opts.id = Some(snapshot.id);
        opts.entries = entries;
        opts.heads = snapshot.heads;
        Self::new(store, provider, identity, opts)
    }

    /// Entries not referenced as a parent by any entry in `entries`,
    /// sorted by clock id. The sort is stable: heads sharing a clock id
    /// keep their incoming order.
    pub fn find_heads<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> Vec<Entry> {
        let mut unique: IndexMap<&str, &Entry> = IndexMap::new();
        for entry in entries {
            unique.entry(entry.hash.as_str()).or_insert(entry);
        }

        let mut referenced: HashSet<&str> = HashSet::new();
        for entry in unique.values() {
            for parent in &entry.next {
                referenced.insert(parent.as_str());
            }
        }

        let mut heads: Vec<Entry> = unique
            .values()
            .filter(|e| !referenced.contains(e.hash.as_str()))
            .map(|e| (*e).clone())
            .collect();
        heads.sort_by(|a, b| a.clock.id.cmp(&b.clock.id));
        heads
    }

    /// Entries with no parents, or with at least one parent missing from
    /// `entries`. Sorted with [`Entry::compare`].
    pub fn find_tails(entries: &[Entry]) -> Vec<Entry> {
        let present: HashSet<&str> = entries.iter().map(|e| e.hash.as_str()).collect();

        let mut seen: HashSet<&str> = HashSet::new();
        let mut tails: Vec<Entry> = entries
            .iter()
            .filter(|e| {
                e.next.is_empty() || e.next.iter().any(|n| !present.contains(n.as_str()))
            })
            .filter(|e| seen.insert(e.hash.as_str()))
            .cloned()
            .collect();
        tails.sort_by(|a, b| Entry::compare(a, b));
        tails
    }

    /// Parent hashes referenced from `entries` but not present in it, in
    /// reverse-first-observed order.
    pub fn find_tail_hashes(entries: &[Entry]) -> Vec<String> {
        let present: HashSet<&str> = entries.iter().map(|e| e.hash.as_str()).collect();

        let mut collected: HashSet<&str> = HashSet::new();
        let mut hashes: Vec<String> = Vec::new();
        for entry in entries.iter().rev() {
            for parent in &entry.next {
                if !present.contains(parent.as_str()) && collected.insert(parent.as_str()) {
                    hashes.push(parent.clone());
                }
            }
        }
        hashes
    }
}
