//! `ragchat` Nostr Protocol Library
//!
//! Hand-written implementation of the slice of the Nostr protocol the chat
//! assistant needs:
//!
//! - **Events**: id hashing, BIP-340 schnorr signing and verification
//! - **Keys**: per-process ephemeral secp256k1 keypairs
//! - **Wire messages**: `EVENT`/`REQ`/`CLOSE` out, `EVENT`/`EOSE`/`OK`/
//!   `NOTICE`/`CLOSED` in
//! - **Filters**: subscription filters with `#e` correlation
//! - **NIP-90**: job request/feedback/result kinds and the request builder

pub mod error;
pub mod event;
pub mod filter;
pub mod job;
pub mod keys;
pub mod message;

pub use error::ProtoError;
pub use event::{Event, EventTemplate};
pub use filter::Filter;
pub use job::{
    JobInput, JobRequest, JobStatus, KIND_JOB_FEEDBACK, KIND_JOB_RAG, result_kind_for,
    is_job_feedback_kind, is_job_request_kind, is_job_result_kind,
};
pub use keys::{Keys, pubkey_from_hex};
pub use message::{ClientMessage, RelayMessage};
