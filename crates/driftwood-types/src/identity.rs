//! Identity descriptors and signing providers.
//!
//! An [`Identity`] is the self-describing author record embedded in every
//! signed log entry. The [`IdentityProvider`] trait is the seam through
//! which the log signs and verifies canonical entry bytes; [`Keystore`] is
//! the built-in ed25519 provider.

use std::collections::HashMap;
use std::sync::RwLock;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

/// Provider type tag for ed25519 keystore identities.
pub const ED25519_TYPE: &str = "ed25519";

/// Errors from identity creation, signing, and verification.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// No signing key is known for the given public key.
    #[error("no signing key for public key {0}")]
    UnknownKey(String),

    /// A public key or signature could not be decoded.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// A signature string could not be decoded.
    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),
}

/// Proof signatures binding an identity's `id` and `public_key` together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySignatures {
    /// Signature over the identity's `id`, by the identity's key.
    pub id: String,
    /// Signature over `public_key` concatenated with `signatures.id`.
    pub public_key: String,
}

/// A self-describing identity embedded in every signed entry.
///
/// Plain serializable data; the signing capability lives in the
/// [`IdentityProvider`] that minted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// External identifier for the author.
    pub id: String,
    /// Hex-encoded ed25519 public key used to sign entries.
    pub public_key: String,
    /// Proof signatures binding `id` and `public_key` together.
    pub signatures: IdentitySignatures,
    /// Provider type tag (e.g. `"ed25519"`).
    #[serde(rename = "type")]
    pub id_type: String,
}

/// Signs and verifies canonical entry bytes on behalf of identities.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Sign `data` with the key behind `identity`. Returns a hex signature.
    async fn sign(&self, identity: &Identity, data: &[u8]) -> Result<String, IdentityError>;

    /// Verify a hex `signature` over `data` under a hex `public_key`.
    async fn verify(
        &self,
        signature: &str,
        public_key: &str,
        data: &[u8],
    ) -> Result<bool, IdentityError>;
}

/// In-memory ed25519 keystore.
///
/// Keys are held per public key so that a single keystore can sign for
/// several identities (one per log author under test, for instance).
pub struct Keystore {
    keys: RwLock<HashMap<String, SigningKey>>,
}

impl Keystore {
    /// Create an empty keystore.
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Mint a fresh identity for `id` with a newly generated keypair.
    pub fn create_identity(&self, id: &str) -> Identity {
        let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        self.insert_identity(id, signing_key)
    }

    /// Mint a deterministic identity from a 32-byte seed.
    ///
    /// Same seed, same keypair — used by tests and fixtures.
    pub fn identity_from_seed(&self, id: &str, seed: [u8; 32]) -> Identity {
        let signing_key = SigningKey::from_bytes(&seed);
        self.insert_identity(id, signing_key)
    }

    /// Verify an identity's internal binding signatures.
    ///
    /// Checks that `signatures.id` signs `id` and `signatures.public_key`
    /// signs `public_key || signatures.id`, both under `public_key`.
    pub fn verify_identity(identity: &Identity) -> Result<bool, IdentityError> {
        let key = decode_verifying_key(&identity.public_key)?;

        let id_sig = decode_signature(&identity.signatures.id)?;
        if key.verify(identity.id.as_bytes(), &id_sig).is_err() {
            return Ok(false);
        }

        let mut bound = identity.public_key.clone();
        bound.push_str(&identity.signatures.id);
        let pk_sig = decode_signature(&identity.signatures.public_key)?;
        Ok(key.verify(bound.as_bytes(), &pk_sig).is_ok())
    }

    fn insert_identity(&self, id: &str, signing_key: SigningKey) -> Identity {
        let public_key = hex::encode(signing_key.verifying_key().to_bytes());

        let id_sig = hex::encode(signing_key.sign(id.as_bytes()).to_bytes());
        let mut bound = public_key.clone();
        bound.push_str(&id_sig);
        let pk_sig = hex::encode(signing_key.sign(bound.as_bytes()).to_bytes());

        self.keys
            .write()
            .unwrap()
            .insert(public_key.clone(), signing_key);

        Identity {
            id: id.to_string(),
            public_key,
            signatures: IdentitySignatures {
                id: id_sig,
                public_key: pk_sig,
            },
            id_type: ED25519_TYPE.to_string(),
        }
    }
}

impl Default for Keystore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl IdentityProvider for Keystore {
    async fn sign(&self, identity: &Identity, data: &[u8]) -> Result<String, IdentityError> {
        let keys = self.keys.read().unwrap();
        let signing_key = keys
            .get(&identity.public_key)
            .ok_or_else(|| IdentityError::UnknownKey(identity.public_key.clone()))?;
        Ok(hex::encode(signing_key.sign(data).to_bytes()))
    }

    async fn verify(
        &self,
        signature: &str,
        public_key: &str,
        data: &[u8],
    ) -> Result<bool, IdentityError> {
        let key = decode_verifying_key(public_key)?;
        let sig = decode_signature(signature)?;
        Ok(key.verify(data, &sig).is_ok())
    }
}

fn decode_verifying_key(public_key: &str) -> Result<VerifyingKey, IdentityError> {
    let bytes = hex::decode(public_key)
        .map_err(|e| IdentityError::InvalidKey(format!("{public_key}: {e}")))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| IdentityError::InvalidKey(format!("{public_key}: wrong length")))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| IdentityError::InvalidKey(e.to_string()))
}

fn decode_signature(signature: &str) -> Result<Signature, IdentityError> {
    let bytes = hex::decode(signature)
        .map_err(|e| IdentityError::InvalidSignature(e.to_string()))?;
    Signature::from_slice(&bytes).map_err(|e| IdentityError::InvalidSignature(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
