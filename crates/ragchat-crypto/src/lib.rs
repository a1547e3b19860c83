//! `ragchat` Envelope Encryption Library
//!
//! End-to-end encryption between the chat assistant and a designated job
//! provider, with the relays unable to see job inputs or results.
//!
//! ## Crypto primitives
//!
//! - **Conversation key**: secp256k1 ECDH against the provider's public key
//!   → HKDF-SHA256 → symmetric key
//! - **Encryption**: ChaCha20-Poly1305 AEAD, 12-byte random nonce
//! - **Wire form**: lowercase hex of `nonce || ciphertext`

pub mod envelope;
pub mod error;

pub use envelope::{Envelope, NONCE_SIZE};
pub use error::CryptoError;
