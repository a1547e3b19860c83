//! Signing keys.
//!
//! The assistant uses a fresh ephemeral keypair per process; nothing is
//! persisted. Keys are secp256k1 and sign with BIP-340 schnorr, as the relay
//! protocol requires.

use secp256k1::rand::rngs::OsRng;
use secp256k1::schnorr::Signature;
use secp256k1::{All, Keypair, Message, Secp256k1, SecretKey, XOnlyPublicKey};

use crate::error::ProtoError;

/// A secp256k1 keypair used to sign outgoing events.
pub struct Keys {
    secp: Secp256k1<All>,
    keypair: Keypair,
    public: XOnlyPublicKey,
}

impl std::fmt::Debug for Keys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keys")
            .field("public", &self.public_hex())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl Keys {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let keypair = Keypair::new(&secp, &mut OsRng);
        let (public, _parity) = keypair.x_only_public_key();
        Self {
            secp,
            keypair,
            public,
        }
    }

    /// Reconstruct from raw 32-byte secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, ProtoError> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| ProtoError::InvalidKey(e.to_string()))?;
        let secp = Secp256k1::new();
        let keypair = Keypair::from_secret_key(&secp, &secret);
        let (public, _parity) = keypair.x_only_public_key();
        Ok(Self {
            secp,
            keypair,
            public,
        })
    }

    /// The x-only public key.
    pub const fn public_key(&self) -> &XOnlyPublicKey {
        &self.public
    }

    /// The x-only public key as lowercase hex, as carried in event `pubkey`
    /// fields and `p` tags.
    pub fn public_hex(&self) -> String {
        hex::encode(self.public.serialize())
    }

    /// The secret key, for ECDH with a provider key.
    pub fn secret_key(&self) -> SecretKey {
        self.keypair.secret_key()
    }

    /// Schnorr-sign a 32-byte digest.
    pub fn sign_digest(&self, digest: [u8; 32]) -> Signature {
        let msg = Message::from_digest(digest);
        self.secp.sign_schnorr(&msg, &self.keypair)
    }
}

/// Parse an x-only public key from lowercase hex.
pub fn pubkey_from_hex(pubkey_hex: &str) -> Result<XOnlyPublicKey, ProtoError> {
    let bytes = hex::decode(pubkey_hex).map_err(|e| ProtoError::InvalidKey(e.to_string()))?;
    XOnlyPublicKey::from_slice(&bytes).map_err(|e| ProtoError::InvalidKey(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn generated_pubkey_is_64_hex_chars() {
        let keys = Keys::generate();
        let hex = keys.public_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn two_keypairs_are_distinct() {
        let a = Keys::generate();
        let b = Keys::generate();
        assert_ne!(a.public_hex(), b.public_hex());
    }

    #[test]
    fn from_secret_bytes_roundtrip() {
        let keys = Keys::generate();
        let secret = keys.secret_key().secret_bytes();
        let rebuilt = Keys::from_secret_bytes(&secret).unwrap();
        assert_eq!(rebuilt.public_hex(), keys.public_hex());
    }

    #[test]
    fn from_secret_bytes_rejects_wrong_length() {
        assert!(Keys::from_secret_bytes(&[0u8; 16]).is_err());
    }

    #[test]
    fn pubkey_from_hex_roundtrip() {
        let keys = Keys::generate();
        let parsed = pubkey_from_hex(&keys.public_hex()).unwrap();
        assert_eq!(&parsed, keys.public_key());
    }

    #[test]
    fn pubkey_from_hex_rejects_garbage() {
        assert!(pubkey_from_hex("not hex").is_err());
        assert!(pubkey_from_hex("abcd").is_err());
    }

    #[test]
    fn debug_impl_redacts_secret() {
        let keys = Keys::generate();
        let debug = format!("{keys:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(&hex::encode(keys.secret_key().secret_bytes())));
    }
}
