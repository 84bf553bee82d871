//! Storage backends for content-addressed blocks (Fjall disk or pure in-memory).

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::RwLock;

use fjall::{Database, Keyspace, KeyspaceCreateOptions};
use libipld::Ipld;
use tracing::debug;

use crate::block::Block;
use crate::codec::Codec;
use crate::error::StoreError;

type Result<T> = std::result::Result<T, StoreError>;

/// A content-addressable block store.
///
/// The store is the substrate logs replicate over: blocks are written under
/// the address derived from their bytes and fetched back by that address.
/// Implementations must be safe for concurrent use.
#[async_trait::async_trait]
pub trait BlockStore: Send + Sync {
    /// Serialize `value` with `codec`, store it, return its content address.
    async fn write(&self, codec: Codec, value: &Ipld, pin: bool) -> Result<String>;

    /// Fetch and decode the block stored under `hash`.
    async fn read(&self, hash: &str) -> Result<Ipld> {
        self.read_block(hash).await?.decode()
    }

    /// Fetch the raw block stored under `hash`.
    async fn read_block(&self, hash: &str) -> Result<Block>;

    /// Whether a block exists under `hash`.
    async fn has(&self, hash: &str) -> Result<bool>;

    /// Mark the block under `hash` as pinned.
    async fn pin(&self, hash: &str) -> Result<()>;
}

/// On-disk record for a stored block.
///
/// The address is not persisted; it is re-derived from `(codec, data)` on
/// load, which doubles as an integrity check.
#[derive(serde::Serialize, serde::Deserialize)]
struct BlockRecord {
    codec: Codec,
    data: Vec<u8>,
}

/// Inner backend: either Fjall-backed (disk) or pure in-memory.
enum Backend {
    Fjall {
        #[allow(dead_code)]
        db: Database,
        blocks: Keyspace,
        pins: Keyspace,
        #[allow(dead_code)]
        tmp: Option<tempfile::TempDir>,
    },
    Memory(Box<MemoryBackend>),
}

/// Pure in-memory storage.
struct MemoryBackend {
    /// hash → block.
    blocks: RwLock<HashMap<String, Block>>,
    /// Set of pinned hashes.
    pins: RwLock<HashSet<String>>,
}

/// Block store with pluggable persistence.
pub struct BlockDb {
    backend: Backend,
}

fn storage_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Storage(e.to_string())
}

impl BlockDb {
    /// Open a persistent store at the given path (Fjall backend).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::builder(path).open().map_err(storage_err)?;
        let backend = Self::init_fjall(db, None)?;
        Ok(Self { backend })
    }

    /// Open a temporary store backed by Fjall (cleaned up on drop).
    pub fn open_temporary() -> Result<Self> {
        let tmp = tempfile::tempdir().map_err(storage_err)?;
        let db = Database::builder(tmp.path())
            .temporary(true)
            .open()
            .map_err(storage_err)?;
        let backend = Self::init_fjall(db, Some(tmp))?;
        Ok(Self { backend })
    }

    /// Create a pure in-memory store.
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(Box::new(MemoryBackend {
                blocks: RwLock::new(HashMap::new()),
                pins: RwLock::new(HashSet::new()),
            })),
        }
    }

    fn init_fjall(db: Database, tmp: Option<tempfile::TempDir>) -> Result<Backend> {
        let blocks = db
            .keyspace("dw_blocks", KeyspaceCreateOptions::default)
            .map_err(storage_err)?;
        let pins = db
            .keyspace("dw_pins", KeyspaceCreateOptions::default)
            .map_err(storage_err)?;
        Ok(Backend::Fjall {
            db,
            blocks,
            pins,
            tmp,
        })
    }

    fn put_block(&self, block: Block) -> Result<String> {
        let hash = block.hash()?;

        match &self.backend {
            Backend::Fjall { blocks, .. } => {
                let record = BlockRecord {
                    codec: block.codec(),
                    data: block.data().to_vec(),
                };
                let bytes = postcard::to_allocvec(&record)?;
                blocks.insert(hash.as_bytes(), bytes).map_err(storage_err)?;
            }
            Backend::Memory(m) => {
                m.blocks.write().unwrap().insert(hash.clone(), block);
            }
        }

        debug!(hash = %hash, "stored block");
        Ok(hash)
    }

    fn get_block(&self, hash: &str) -> Result<Block> {
        match &self.backend {
            Backend::Fjall { blocks, .. } => {
                let bytes = blocks
                    .get(hash.as_bytes())
                    .map_err(storage_err)?
                    .map(|v| v.to_vec())
                    .ok_or_else(|| StoreError::NotFound(hash.to_string()))?;
                let record: BlockRecord = postcard::from_bytes(&bytes)?;
                Block::from_parts(record.codec, record.data)
            }
            Backend::Memory(m) => m
                .blocks
                .read()
                .unwrap()
                .get(hash)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(hash.to_string())),
        }
    }

    fn has_block(&self, hash: &str) -> Result<bool> {
        match &self.backend {
            Backend::Fjall { blocks, .. } => {
                Ok(blocks.get(hash.as_bytes()).map_err(storage_err)?.is_some())
            }
            Backend::Memory(m) => Ok(m.blocks.read().unwrap().contains_key(hash)),
        }
    }

    fn pin_block(&self, hash: &str) -> Result<()> {
        match &self.backend {
            Backend::Fjall { pins, .. } => {
                pins.insert(hash.as_bytes(), []).map_err(storage_err)?;
            }
            Backend::Memory(m) => {
                m.pins.write().unwrap().insert(hash.to_string());
            }
        }
        Ok(())
    }

    /// Whether the block under `hash` is pinned.
    pub fn is_pinned(&self, hash: &str) -> Result<bool> {
        match &self.backend {
            Backend::Fjall { pins, .. } => {
                Ok(pins.get(hash.as_bytes()).map_err(storage_err)?.is_some())
            }
            Backend::Memory(m) => Ok(m.pins.read().unwrap().contains(hash)),
        }
    }
}

#[async_trait::async_trait]
impl BlockStore for BlockDb {
    async fn write(&self, codec: Codec, value: &Ipld, pin: bool) -> Result<String> {
        let block = Block::encode(codec, value)?;
        let hash = self.put_block(block)?;
        if pin {
            self.pin_block(&hash)?;
        }
        Ok(hash)
    }

    async fn read_block(&self, hash: &str) -> Result<Block> {
        self.get_block(hash)
    }

    async fn has(&self, hash: &str) -> Result<bool> {
        self.has_block(hash)
    }

    async fn pin(&self, hash: &str) -> Result<()> {
        self.pin_block(hash)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::json_to_ipld;
    use serde_json::json;

    async fn roundtrip(store: &BlockDb) {
        let value = json_to_ipld(&json!({"payload": "hello", "n": 7}));
        let hash = store.write(Codec::DagCbor, &value, false).await.unwrap();
        assert!(hash.starts_with("zdpu"));

        assert!(store.has(&hash).await.unwrap());
        let read = store.read(&hash).await.unwrap();
        assert_eq!(read, value);
    }

    #[tokio::test]
    async fn test_memory_roundtrip() {
        roundtrip(&BlockDb::in_memory()).await;
    }

    #[tokio::test]
    async fn test_fjall_roundtrip() {
        roundtrip(&BlockDb::open_temporary().unwrap()).await;
    }

    #[tokio::test]
    async fn test_write_is_idempotent() {
        let store = BlockDb::in_memory();
        let value = json_to_ipld(&json!({"payload": "same"}));
        let a = store.write(Codec::DagCbor, &value, false).await.unwrap();
        let b = store.write(Codec::DagCbor, &value, false).await.unwrap();
        assert_eq!(a, b, "identical content must land at the same address");
    }

    #[tokio::test]
    async fn test_missing_block_is_not_found() {
        let store = BlockDb::in_memory();
        let err = store
            .read("zdpuAyvJu3CaakCpQJcjMGyduVLumBczDSJVeCLnnyH6kr3pv")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_pin_is_tracked() {
        let store = BlockDb::in_memory();
        let value = json_to_ipld(&json!({"payload": "pinned"}));
        let hash = store.write(Codec::DagCbor, &value, true).await.unwrap();
        assert!(store.is_pinned(&hash).unwrap());

        let other = json_to_ipld(&json!({"payload": "loose"}));
        let loose = store.write(Codec::DagCbor, &other, false).await.unwrap();
        assert!(!store.is_pinned(&loose).unwrap());
    }

    #[tokio::test]
    async fn test_fjall_rederives_address_on_read() {
        let store = BlockDb::open_temporary().unwrap();
        let value = json_to_ipld(&json!({"k": [1, 2, 3]}));
        let hash = store.write(Codec::DagCbor, &value, false).await.unwrap();
        let block = store.read_block(&hash).await.unwrap();
        assert_eq!(block.hash().unwrap(), hash);
        block.validate().unwrap();
    }
}
