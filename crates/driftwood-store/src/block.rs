//! A content-addressed block: codec, bytes, and the CID derived from them.

use cid::Cid;
use libipld::Ipld;
use multihash::{Code, MultihashDigest};

use crate::codec::{Codec, cid_to_string};
use crate::error::StoreError;

/// An immutable block of serialized data together with its content address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    cid: Cid,
    codec: Codec,
    data: Vec<u8>,
}

impl Block {
    /// Serialize `value` with `codec` and derive its content address.
    pub fn encode(codec: Codec, value: &Ipld) -> Result<Block, StoreError> {
        let data = codec.encode(value)?;
        let cid = codec.cid(&data)?;
        Ok(Block { cid, codec, data })
    }

    /// Rebuild a block from stored parts, re-deriving the address.
    pub fn from_parts(codec: Codec, data: Vec<u8>) -> Result<Block, StoreError> {
        let cid = codec.cid(&data)?;
        Ok(Block { cid, codec, data })
    }

    /// Decode the block's bytes back into an IPLD value.
    pub fn decode(&self) -> Result<Ipld, StoreError> {
        self.codec.decode(&self.data)
    }

    /// The block's content address.
    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    /// The block's content address in canonical text form.
    pub fn hash(&self) -> Result<String, StoreError> {
        cid_to_string(&self.cid)
    }

    /// The codec the block was serialized with.
    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// The serialized bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Check that the stored address matches the data's digest.
    pub fn validate(&self) -> Result<(), StoreError> {
        let digest = Code::Sha2_256.digest(&self.data);
        if digest.digest() != self.cid.hash().digest() {
            return Err(StoreError::Codec(format!(
                "digest mismatch for block {}",
                self.cid
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::json_to_ipld;
    use serde_json::json;

    #[test]
    fn test_encode_is_deterministic() {
        let value = json_to_ipld(&json!({"payload": "hello"}));
        let a = Block::encode(Codec::DagCbor, &value).unwrap();
        let b = Block::encode(Codec::DagCbor, &value).unwrap();
        assert_eq!(a.cid(), b.cid());
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn test_different_values_different_addresses() {
        let a = Block::encode(Codec::DagCbor, &json_to_ipld(&json!({"p": "one"}))).unwrap();
        let b = Block::encode(Codec::DagCbor, &json_to_ipld(&json!({"p": "two"}))).unwrap();
        assert_ne!(a.cid(), b.cid());
    }

    #[test]
    fn test_from_parts_rederives_same_cid() {
        let value = json_to_ipld(&json!({"payload": "hello"}));
        let block = Block::encode(Codec::DagCbor, &value).unwrap();
        let rebuilt = Block::from_parts(Codec::DagCbor, block.data().to_vec()).unwrap();
        assert_eq!(block.cid(), rebuilt.cid());
        assert_eq!(block.decode().unwrap(), rebuilt.decode().unwrap());
    }

    #[test]
    fn test_validate_catches_tampering() {
        let value = json_to_ipld(&json!({"payload": "hello"}));
        let block = Block::encode(Codec::DagCbor, &value).unwrap();
        block.validate().unwrap();

        let mut data = block.data().to_vec();
        data[0] ^= 0xff;
        let tampered = Block {
            cid: *block.cid(),
            codec: block.codec(),
            data,
        };
        assert!(tampered.validate().is_err());
    }
}
