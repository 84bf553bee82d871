//! Content-addressable block storage for Driftwood.
//!
//! Blocks are immutable byte strings addressed by the hash of their
//! serialized form. The modern codec is dag-cbor under CIDv1 (text form
//! `zdpu…`); the legacy codec is dag-pb under CIDv0 (`Qm…`) and exists only
//! so historical entries keep their original addresses.
//!
//! [`BlockStore`] is the trait the log consumes; [`BlockDb`] implements it
//! over either a Fjall database on disk or a pure in-memory map.

mod block;
mod codec;
mod error;
mod store;

pub use block::Block;
pub use codec::{Codec, cid_to_string, ipld_to_json, json_to_ipld, parse_cid};
pub use error::StoreError;
pub use store::{BlockDb, BlockStore};

pub use libipld::Ipld;
