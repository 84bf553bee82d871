//! Block codecs and content addressing.
//!
//! Two codecs are supported: [`Codec::DagCbor`] for current blocks,
//! addressed as CIDv1 rendered in base58btc (`zdpu…`), and the read-only
//! [`Codec::DagPb`] legacy format, addressed as CIDv0 (`Qm…`).

use std::collections::BTreeMap;
use std::io::Cursor;

use cid::Cid;
use libipld::Ipld;
use libipld::IpldCodec;
use libipld::prelude::{Decode, Encode};
use multibase::Base;
use multihash::{Code, MultihashDigest};
use serde_json::Value;

use crate::error::StoreError;

/// Multicodec code for dag-cbor.
const DAG_CBOR: u64 = 0x71;

/// Block serialization format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Codec {
    /// Current structured codec. CIDv1, sha2-256, base58btc text form.
    DagCbor,
    /// Historical protobuf envelope. CIDv0, sha2-256, base58btc text form.
    /// Written only to re-derive legacy content addresses.
    DagPb,
}

impl Codec {
    fn ipld_codec(self) -> IpldCodec {
        match self {
            Codec::DagCbor => IpldCodec::DagCbor,
            Codec::DagPb => IpldCodec::DagPb,
        }
    }

    /// Serialize an IPLD value with this codec.
    pub fn encode(self, value: &Ipld) -> Result<Vec<u8>, StoreError> {
        let mut bytes = Vec::new();
        value
            .encode(self.ipld_codec(), &mut bytes)
            .map_err(|e| StoreError::Codec(e.to_string()))?;
        Ok(bytes)
    }

    /// Deserialize an IPLD value with this codec.
    pub fn decode(self, bytes: &[u8]) -> Result<Ipld, StoreError> {
        Ipld::decode(self.ipld_codec(), &mut Cursor::new(bytes))
            .map_err(|e| StoreError::Codec(e.to_string()))
    }

    /// Derive the content address for a serialized block.
    pub fn cid(self, bytes: &[u8]) -> Result<Cid, StoreError> {
        let digest = Code::Sha2_256.digest(bytes);
        match self {
            Codec::DagCbor => Ok(Cid::new_v1(DAG_CBOR, digest)),
            Codec::DagPb => Cid::new_v0(digest).map_err(|e| StoreError::Codec(e.to_string())),
        }
    }

    /// Which codec a parsed CID was produced by.
    pub fn for_cid(cid: &Cid) -> Result<Codec, StoreError> {
        match cid.codec() {
            DAG_CBOR => Ok(Codec::DagCbor),
            0x70 => Ok(Codec::DagPb),
            other => Err(StoreError::Codec(format!("unsupported multicodec {other:#x}"))),
        }
    }
}

/// Render a CID in its canonical text form.
///
/// CIDv0 has exactly one text form (`Qm…`). CIDv1 is rendered in base58btc
/// so current-format addresses read `zdpu…`.
pub fn cid_to_string(cid: &Cid) -> Result<String, StoreError> {
    match cid.version() {
        cid::Version::V0 => Ok(cid.to_string()),
        _ => cid
            .to_string_of_base(Base::Base58Btc)
            .map_err(|e| StoreError::InvalidCid(e.to_string())),
    }
}

/// Parse a content address string.
pub fn parse_cid(hash: &str) -> Result<Cid, StoreError> {
    Cid::try_from(hash).map_err(|e| StoreError::InvalidCid(format!("{hash}: {e}")))
}

/// Convert a JSON value into IPLD for block encoding.
pub fn json_to_ipld(value: &Value) -> Ipld {
    match value {
        Value::Null => Ipld::Null,
        Value::Bool(b) => Ipld::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ipld::Integer(i as i128)
            } else if let Some(u) = n.as_u64() {
                Ipld::Integer(u as i128)
            } else {
                Ipld::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => Ipld::String(s.clone()),
        Value::Array(items) => Ipld::List(items.iter().map(json_to_ipld).collect()),
        Value::Object(map) => Ipld::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_ipld(v)))
                .collect::<BTreeMap<_, _>>(),
        ),
    }
}

/// Convert an IPLD value back into JSON.
///
/// Links collapse to their text form; raw bytes have no JSON analogue and
/// are rejected.
pub fn ipld_to_json(ipld: &Ipld) -> Result<Value, StoreError> {
    match ipld {
        Ipld::Null => Ok(Value::Null),
        Ipld::Bool(b) => Ok(Value::Bool(*b)),
        Ipld::Integer(i) => {
            let i = i64::try_from(*i)
                .map_err(|_| StoreError::UnsupportedValue(format!("integer {i} out of range")))?;
            Ok(Value::Number(i.into()))
        }
        Ipld::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .ok_or_else(|| StoreError::UnsupportedValue("non-finite float".to_string())),
        Ipld::String(s) => Ok(Value::String(s.clone())),
        Ipld::Bytes(_) => Err(StoreError::UnsupportedValue("raw bytes".to_string())),
        Ipld::List(items) => items
            .iter()
            .map(ipld_to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Ipld::Map(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), ipld_to_json(v)?);
            }
            Ok(Value::Object(out))
        }
        Ipld::Link(cid) => Ok(Value::String(cid_to_string(cid)?)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
