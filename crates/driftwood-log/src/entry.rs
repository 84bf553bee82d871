//! Log entries: creation, canonical encoding, signing, and verification.
//!
//! An entry is one immutable node of the Merkle DAG. Its content address
//! covers the canonical encoding of every field except `hash` itself; its
//! signature covers the same encoding with `sig` also absent. Version 0
//! entries are a read-only legacy format kept so historical addresses stay
//! valid.

use driftwood_store::{BlockStore, Codec, Ipld, ipld_to_json, json_to_ipld};
use driftwood_types::{Identity, IdentityProvider, LamportClock};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LogError;
use crate::sorting;

/// Current entry protocol version.
pub const ENTRY_VERSION: u8 = 1;

/// One immutable record of the log.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Content address of the entry's canonical block.
    pub hash: String,
    /// Identifier of the log the entry belongs to.
    pub id: String,
    /// Opaque payload.
    pub payload: Value,
    /// Parent entry hashes: the log's heads at the moment of append.
    pub next: Vec<String>,
    /// Skip-list reference hashes for bounded backward traversal.
    pub refs: Vec<String>,
    /// Protocol version. `0` for legacy entries, [`ENTRY_VERSION`] otherwise.
    pub v: u8,
    /// Lamport clock at creation.
    pub clock: LamportClock,
    /// Author's public key, hex.
    pub key: String,
    /// Author's identity descriptor. Legacy entries carry none.
    pub identity: Option<Identity>,
    /// Signature over the canonical bytes, hex.
    pub sig: String,
}

/// Optional parts of [`Entry::create`].
#[derive(Default)]
pub struct CreateOpts {
    /// Clock to stamp the entry with; defaults to `(author key, 0)`.
    pub clock: Option<LamportClock>,
    /// Skip-list references.
    pub refs: Vec<String>,
    /// Pin the stored block.
    pub pin: bool,
}

/// Canonical v1 encoding: fixed field order, `hash` always null, `sig`
/// present only in the addressed (stored) form.
#[derive(Serialize)]
struct CanonicalV1<'a> {
    hash: Option<()>,
    id: &'a str,
    payload: &'a Value,
    next: &'a [String],
    refs: &'a [String],
    v: u8,
    clock: &'a LamportClock,
    key: &'a str,
    identity: &'a Identity,
    #[serde(skip_serializing_if = "Option::is_none")]
    sig: Option<&'a str>,
}

/// Canonical v0 encoding (legacy field order, no `refs`, no `identity`).
#[derive(Serialize)]
struct CanonicalV0<'a> {
    hash: Option<()>,
    id: &'a str,
    payload: &'a Value,
    next: &'a [String],
    v: u8,
    clock: &'a LamportClock,
    key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sig: Option<&'a str>,
}

/// Wire shape shared by both versions when decoding a stored block.
#[derive(Deserialize)]
struct WireEntry {
    id: String,
    payload: Value,
    next: Vec<String>,
    #[serde(default)]
    refs: Vec<String>,
    v: u8,
    clock: LamportClock,
    key: String,
    #[serde(default)]
    identity: Option<Identity>,
    sig: String,
}

impl Entry {
    /// Create a signed entry and store its canonical block.
    ///
    /// `next` may repeat hashes; duplicates are dropped while preserving
    /// first-seen order. The returned entry carries the content address the
    /// store assigned.
    pub async fn create(
        store: &dyn BlockStore,
        provider: &dyn IdentityProvider,
        identity: &Identity,
        id: &str,
        payload: Value,
        next: &[String],
        opts: CreateOpts,
    ) -> Result<Entry, LogError> {
        if id.is_empty() {
            return Err(LogError::EntryIdRequired);
        }

        let mut deduped: Vec<String> = Vec::with_capacity(next.len());
        for hash in next {
            if !deduped.contains(hash) {
                deduped.push(hash.clone());
            }
        }

        let mut entry = Entry {
            hash: String::new(),
            id: id.to_string(),
            payload,
            next: deduped,
            refs: opts.refs,
            v: ENTRY_VERSION,
            clock: opts
                .clock
                .unwrap_or_else(|| LamportClock::new(identity.public_key.clone())),
            key: identity.public_key.clone(),
            identity: Some(identity.clone()),
            sig: String::new(),
        };

        let bytes = entry.signing_bytes()?;
        entry.sig = provider.sign(identity, &bytes).await?;
        entry.hash = Self::to_multihash(store, &entry, opts.pin).await?;

        Ok(entry)
    }

    /// Write the entry's canonical form to the store and return its address.
    pub async fn to_multihash(
        store: &dyn BlockStore,
        entry: &Entry,
        pin: bool,
    ) -> Result<String, LogError> {
        let ipld = entry.to_ipld()?;
        Ok(store.write(entry.codec(), &ipld, pin).await?)
    }

    /// Fetch and decode the entry stored under `hash`.
    ///
    /// Legacy blocks are normalized: `refs` defaults to empty and the
    /// identity stays absent.
    pub async fn from_multihash(store: &dyn BlockStore, hash: &str) -> Result<Entry, LogError> {
        let block = store.read_block(hash).await?;
        let value = match block.codec() {
            Codec::DagCbor => ipld_to_json(&block.decode()?)?,
            Codec::DagPb => {
                let data = legacy_block_data(&block.decode()?)?;
                serde_json::from_slice(&data)?
            }
        };

        let wire: WireEntry = serde_json::from_value(value)?;
        Ok(Entry {
            hash: hash.to_string(),
            id: wire.id,
            payload: wire.payload,
            next: wire.next,
            refs: wire.refs,
            v: wire.v,
            clock: wire.clock,
            key: wire.key,
            identity: wire.identity,
            sig: wire.sig,
        })
    }

    /// Verify an entry's signature and content address.
    pub async fn verify(provider: &dyn IdentityProvider, entry: &Entry) -> Result<(), LogError> {
        let bytes = entry.signing_bytes()?;
        let ok = provider.verify(&entry.sig, &entry.key, &bytes).await?;
        if !ok {
            return Err(LogError::InvalidSignature {
                sig: entry.sig.clone(),
                hash: entry.hash.clone(),
                key: entry.key.clone(),
            });
        }

        let expected = entry.content_address()?;
        if expected != entry.hash {
            return Err(LogError::HashMismatch {
                actual: entry.hash.clone(),
                expected,
            });
        }

        Ok(())
    }

    /// Derive the entry's content address without touching the store.
    pub fn content_address(&self) -> Result<String, LogError> {
        let block = driftwood_store::Block::encode(self.codec(), &self.to_ipld()?)?;
        Ok(block.hash()?)
    }

    /// The canonical bytes the signature covers: the entry with `hash`
    /// nulled and `sig` absent, fields in declaration order.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, LogError> {
        if self.v == 0 {
            return Ok(serde_json::to_vec(&self.canonical_v0(false))?);
        }
        Ok(serde_json::to_vec(&self.canonical_v1(false)?)?)
    }

    /// The canonical JSON of the addressed (stored) form: `hash` nulled,
    /// `sig` present. Only ever fed to order-insensitive codecs.
    fn addressed_value(&self) -> Result<Value, LogError> {
        if self.v == 0 {
            return Ok(serde_json::to_value(self.canonical_v0(true))?);
        }
        Ok(serde_json::to_value(self.canonical_v1(true)?)?)
    }

    fn canonical_v0(&self, with_sig: bool) -> CanonicalV0<'_> {
        CanonicalV0 {
            hash: None,
            id: &self.id,
            payload: &self.payload,
            next: &self.next,
            v: self.v,
            clock: &self.clock,
            key: &self.key,
            sig: with_sig.then_some(self.sig.as_str()),
        }
    }

    fn canonical_v1(&self, with_sig: bool) -> Result<CanonicalV1<'_>, LogError> {
        let identity = self.identity.as_ref().ok_or(LogError::InvalidEntryFormat)?;
        if self.id.is_empty() || self.key.is_empty() {
            return Err(LogError::InvalidEntryFormat);
        }
        Ok(CanonicalV1 {
            hash: None,
            id: &self.id,
            payload: &self.payload,
            next: &self.next,
            refs: &self.refs,
            v: self.v,
            clock: &self.clock,
            key: &self.key,
            identity,
            sig: with_sig.then_some(self.sig.as_str()),
        })
    }

    /// The block representation written to the store.
    fn to_ipld(&self) -> Result<Ipld, LogError> {
        if self.v == 0 {
            // Legacy blocks wrap the canonical JSON bytes in a protobuf
            // envelope so their historical CIDv0 addresses stay valid. The
            // bytes keep the legacy field order.
            let data = serde_json::to_vec(&self.canonical_v0(true))?;
            return Ok(Ipld::Map(
                [
                    ("Data".to_string(), Ipld::Bytes(data)),
                    ("Links".to_string(), Ipld::List(vec![])),
                ]
                .into_iter()
                .collect(),
            ));
        }
        Ok(json_to_ipld(&self.addressed_value()?))
    }

    fn codec(&self) -> Codec {
        if self.v == 0 { Codec::DagPb } else { Codec::DagCbor }
    }

    /// The id access decisions key on: the identity id when present,
    /// otherwise the signing key.
    pub fn author_id(&self) -> &str {
        self.identity
            .as_ref()
            .map(|i| i.id.as_str())
            .unwrap_or(&self.key)
    }

    /// Whether `parent` is a direct causal parent of `child`.
    pub fn is_parent(parent: &Entry, child: &Entry) -> bool {
        child.next.iter().any(|n| n == &parent.hash)
    }

    /// Entries are equal when their content addresses are.
    pub fn is_equal(a: &Entry, b: &Entry) -> bool {
        a.hash == b.hash
    }

    /// The default total order: clock, then hash.
    pub fn compare(a: &Entry, b: &Entry) -> std::cmp::Ordering {
        sorting::last_write_wins(a, b)
    }

    /// Entries in `all` that reference `entry` as a parent, sorted by clock.
    pub fn find_children(entry: &Entry, all: &[Entry]) -> Vec<Entry> {
        let mut children: Vec<Entry> = all
            .iter()
            .filter(|e| Self::is_parent(entry, e))
            .cloned()
            .collect();
        children.sort_by(|a, b| LamportClock::compare(&a.clock, &b.clock));
        children
    }
}

/// Whether a decoded JSON value has the shape of an entry: `id`, `next`
/// (a sequence), `v`, `hash`, `payload`, and `clock` all present.
pub fn looks_like_entry(value: &Value) -> bool {
    value.get("id").is_some()
        && value.get("next").is_some_and(Value::is_array)
        && value.get("v").is_some()
        && value.get("hash").is_some()
        && value.get("payload").is_some()
        && value.get("clock").is_some()
}

/// Pull the canonical JSON bytes out of a legacy protobuf envelope.
fn legacy_block_data(ipld: &Ipld) -> Result<Vec<u8>, LogError> {
    if let Ipld::Map(map) = ipld
        && let Some(Ipld::Bytes(data)) = map.get("Data")
    {
        return Ok(data.clone());
    }
    Err(LogError::InvalidEntryFormat)
}
