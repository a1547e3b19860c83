//! Events: the unit of exchange on the relay network.
//!
//! An event's `id` is the SHA-256 of its canonical serialization
//! `[0, pubkey, created_at, kind, tags, content]` as compact JSON, and `sig`
//! is a BIP-340 schnorr signature over that digest.

use secp256k1::schnorr::Signature;
use secp256k1::{Message, Secp256k1};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ProtoError;
use crate::keys::{Keys, pubkey_from_hex};

/// A signed event as it travels over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

/// An unsigned event under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTemplate {
    pub kind: u16,
    pub created_at: u64,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

/// Compute the canonical event digest.
fn event_digest(
    pubkey: &str,
    created_at: u64,
    kind: u16,
    tags: &[Vec<String>],
    content: &str,
) -> Result<[u8; 32], ProtoError> {
    let canonical = serde_json::to_string(&serde_json::json!([
        0, pubkey, created_at, kind, tags, content
    ]))?;
    Ok(Sha256::digest(canonical.as_bytes()).into())
}

impl EventTemplate {
    /// Create a template stamped with the current unix time.
    pub fn new(kind: u16, tags: Vec<Vec<String>>, content: impl Into<String>) -> Self {
        Self {
            kind,
            created_at: unix_now(),
            tags,
            content: content.into(),
        }
    }

    /// Finalize the template: compute the id and sign it.
    pub fn sign(self, keys: &Keys) -> Result<Event, ProtoError> {
        let pubkey = keys.public_hex();
        let digest = event_digest(&pubkey, self.created_at, self.kind, &self.tags, &self.content)?;
        let sig = keys.sign_digest(digest);
        Ok(Event {
            id: hex::encode(digest),
            pubkey,
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
            sig: sig.to_string(),
        })
    }
}

impl Event {
    /// Verify that the id matches the content and the signature matches the id.
    pub fn verify(&self) -> Result<(), ProtoError> {
        let digest = event_digest(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        )?;
        let expected = hex::encode(digest);
        if expected != self.id {
            return Err(ProtoError::IdMismatch {
                expected,
                actual: self.id.clone(),
            });
        }

        let pubkey = pubkey_from_hex(&self.pubkey)?;
        let sig_bytes =
            hex::decode(&self.sig).map_err(|e| ProtoError::InvalidSignature(e.to_string()))?;
        let sig = Signature::from_slice(&sig_bytes)
            .map_err(|e| ProtoError::InvalidSignature(e.to_string()))?;

        let secp = Secp256k1::verification_only();
        secp.verify_schnorr(&sig, &Message::from_digest(digest), &pubkey)
            .map_err(|e| ProtoError::InvalidSignature(e.to_string()))
    }

    /// Value of the first tag named `name`, if present.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.first().is_some_and(|n| n == name))
            .and_then(|t| t.get(1))
            .map(String::as_str)
    }

    /// Whether any tag named `name` is present (value or not).
    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.first().is_some_and(|n| n == name))
    }
}

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
