//! Relay error types.

use thiserror::Error;

/// Errors from the relay pool and job dispatcher.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("No relays available")]
    NoRelaysAvailable,

    #[error("Job was displaced by a newer request")]
    JobDisplaced,

    #[error(transparent)]
    Proto(#[from] ragchat_proto::ProtoError),

    #[error(transparent)]
    Crypto(#[from] ragchat_crypto::CryptoError),
}
