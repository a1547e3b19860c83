//! The envelope codec.
//!
//! Both directions of a job use the same conversation key: the requester
//! derives it from its ephemeral secret and the provider's public key, the
//! provider from its secret and the requester's public key. X-only keys are
//! lifted with even parity, per BIP-340.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use rand::rngs::OsRng;
use secp256k1::ecdh::shared_secret_point;
use secp256k1::{Parity, PublicKey, SecretKey, XOnlyPublicKey};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::CryptoError;

/// HKDF info string for conversation key derivation.
const HKDF_INFO: &[u8] = b"ragchat-envelope-v1";

/// HKDF salt for domain separation (recommended by RFC 5869).
const HKDF_SALT: &[u8] = b"ragchat-envelope-hkdf-salt-v1";

/// Nonce size for ChaCha20-Poly1305.
pub const NONCE_SIZE: usize = 12;

/// A sealed-payload codec keyed for one requester/provider pair.
pub struct Envelope {
    cipher: ChaCha20Poly1305,
}

/// Derive a 32-byte key from an ECDH shared secret via HKDF-SHA256.
fn hkdf_derive(shared_secret: &[u8; 32]) -> Result<[u8; 32], CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), shared_secret);
    let mut key = [0u8; 32];
    hk.expand(HKDF_INFO, &mut key)
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
    Ok(key)
}

impl Envelope {
    /// Derive the conversation key for a recipient's x-only public key.
    ///
    /// Only the x coordinate of the ECDH point feeds the KDF, so the
    /// derivation is independent of either side's key parity.
    pub fn for_recipient(
        local_secret: &SecretKey,
        recipient: &XOnlyPublicKey,
    ) -> Result<Self, CryptoError> {
        let point = PublicKey::from_x_only_public_key(*recipient, Parity::Even);
        let mut xy = shared_secret_point(&point, local_secret);
        let mut shared = [0u8; 32];
        shared.copy_from_slice(&xy[..32]);
        xy.zeroize();
        let codec = Self::from_shared_secret(&shared);
        shared.zeroize();
        codec
    }

    /// Create a codec from a raw 32-byte shared secret.
    pub fn from_shared_secret(shared_secret: &[u8; 32]) -> Result<Self, CryptoError> {
        let mut key_bytes = hkdf_derive(shared_secret)?;
        let key = Key::from_slice(&key_bytes);
        let cipher = ChaCha20Poly1305::new(key);
        key_bytes.zeroize();
        Ok(Self { cipher })
    }

    /// Encrypt a payload into its wire form: hex of `nonce || ciphertext`.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut wire = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        wire.extend_from_slice(&nonce_bytes);
        wire.extend_from_slice(&ciphertext);
        Ok(hex::encode(wire))
    }

    /// Decrypt a wire-form payload.
    pub fn open(&self, wire: &str) -> Result<Vec<u8>, CryptoError> {
        let bytes =
            hex::decode(wire).map_err(|e| CryptoError::MalformedEnvelope(e.to_string()))?;
        if bytes.len() <= NONCE_SIZE {
            return Err(CryptoError::MalformedEnvelope(format!(
                "envelope too short: {} bytes",
                bytes.len()
            )));
        }
        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
    }

    /// Decrypt a wire-form payload into a string.
    pub fn open_string(&self, wire: &str) -> Result<String, CryptoError> {
        let plaintext = self.open(wire)?;
        String::from_utf8(plaintext).map_err(|e| CryptoError::MalformedEnvelope(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use secp256k1::Secp256k1;

    /// Two keypairs plus the codecs each side would derive.
    fn envelope_pair() -> (Envelope, Envelope) {
        let secp = Secp256k1::new();
        let (requester_sk, requester_pk) = secp.generate_keypair(&mut OsRng);
        let (provider_sk, provider_pk) = secp.generate_keypair(&mut OsRng);

        let requester = Envelope::for_recipient(
            &requester_sk,
            &provider_pk.x_only_public_key().0,
        )
        .unwrap();
        let provider = Envelope::for_recipient(
            &provider_sk,
            &requester_pk.x_only_public_key().0,
        )
        .unwrap();
        (requester, provider)
    }

    #[test]
    fn seal_open_roundtrip_both_directions() {
        let (requester, provider) = envelope_pair();

        let sealed = requester.seal(b"retrieval context").unwrap();
        assert_eq!(provider.open(&sealed).unwrap(), b"retrieval context");

        let reply = provider.seal(b"result payload").unwrap();
        assert_eq!(requester.open(&reply).unwrap(), b"result payload");
    }

    #[test]
    fn derivation_ignores_key_parity() {
        let secp = Secp256k1::new();
        // Run across many random keypairs so both parities occur.
        for _ in 0..16 {
            let (a_sk, a_pk) = secp.generate_keypair(&mut OsRng);
            let (b_sk, b_pk) = secp.generate_keypair(&mut OsRng);
            let a_side = Envelope::for_recipient(&a_sk, &b_pk.x_only_public_key().0).unwrap();
            let b_side = Envelope::for_recipient(&b_sk, &a_pk.x_only_public_key().0).unwrap();
            let sealed = a_side.seal(b"hello provider").unwrap();
            assert_eq!(b_side.open(&sealed).unwrap(), b"hello provider");
        }
    }

    #[test]
    fn wire_form_is_hex() {
        let envelope = Envelope::from_shared_secret(&[1u8; 32]).unwrap();
        let wire = envelope.seal(b"x").unwrap();
        assert!(wire.chars().all(|c| c.is_ascii_hexdigit()));
        // 12-byte nonce + 1 byte plaintext + 16-byte tag
        assert_eq!(wire.len(), (NONCE_SIZE + 1 + 16) * 2);
    }

    #[test]
    fn seal_empty_payload() {
        let envelope = Envelope::from_shared_secret(&[2u8; 32]).unwrap();
        let wire = envelope.seal(b"").unwrap();
        assert!(envelope.open(&wire).unwrap().is_empty());
    }

    #[test]
    fn open_with_wrong_key_fails() {
        let a = Envelope::from_shared_secret(&[3u8; 32]).unwrap();
        let b = Envelope::from_shared_secret(&[4u8; 32]).unwrap();
        let wire = a.seal(b"secret").unwrap();
        assert!(matches!(
            b.open(&wire),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let envelope = Envelope::from_shared_secret(&[5u8; 32]).unwrap();
        let wire = envelope.seal(b"secret").unwrap();
        // Flip the last nibble
        let mut tampered = wire.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });
        assert!(envelope.open(&tampered).is_err());
    }

    #[test]
    fn malformed_wire_is_rejected() {
        let envelope = Envelope::from_shared_secret(&[6u8; 32]).unwrap();
        assert!(matches!(
            envelope.open("not hex"),
            Err(CryptoError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            envelope.open("abcd"),
            Err(CryptoError::MalformedEnvelope(_))
        ));
        // Exactly nonce-sized: no ciphertext at all
        assert!(envelope.open(&"00".repeat(NONCE_SIZE)).is_err());
    }

    #[test]
    fn nonces_are_fresh_per_seal() {
        let envelope = Envelope::from_shared_secret(&[8u8; 32]).unwrap();
        let a = envelope.seal(b"same payload").unwrap();
        let b = envelope.seal(b"same payload").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn open_string_rejects_invalid_utf8() {
        let envelope = Envelope::from_shared_secret(&[9u8; 32]).unwrap();
        let wire = envelope.seal(&[0xff, 0xfe]).unwrap();
        assert!(envelope.open_string(&wire).is_err());
    }

}
