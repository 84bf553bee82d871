//! Append-only, signed, content-addressed CRDT log.
//!
//! A [`Log`] is a Merkle DAG of signed [`Entry`] records replicated over a
//! content-addressable block store. Peers append locally, exchange entries
//! by hash, and [`Log::join`] arbitrary subsets into a deterministic,
//! causally consistent ordering. Conflict resolution is Last-Writer-Wins
//! over Lamport clocks, with the author's clock id and the entry hash as
//! tiebreaks.
//!
//! Entries carry two kinds of backward links: `next` (the heads at the
//! moment of append, i.e. causal parents) and `refs` (skip-list shortcuts
//! to geometrically spaced ancestors, so a reader holding a head can bound
//! its traversal depth without O(n) round trips).

mod access;
mod entry;
mod error;
mod hydrate;
mod log;
mod sorting;

#[cfg(test)]
mod tests;

pub use access::{AccessController, AllowlistAccess, PermissiveAccess};
pub use entry::{CreateOpts, ENTRY_VERSION, Entry, looks_like_entry};
pub use error::LogError;
pub use hydrate::{
    DEFAULT_CONCURRENCY, FetchOptions, HydratedLog, LogManifest, ProgressFn, fetch_all,
};
pub use log::{DEFAULT_JOIN_CONCURRENCY, IterOptions, Log, LogOptions, LogSnapshot};
pub use sorting::{
    SortFn, default_sort, last_write_wins, no_zeroes, no_zeroes_sort, sort_by_clock_id,
    sort_by_clocks, sort_by_entry_hash, sort_entries,
};
