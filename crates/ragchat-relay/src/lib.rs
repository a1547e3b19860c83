//! `ragchat` Relay Library
//!
//! Client-side plumbing for the relay network:
//!
//! - **Pool**: one WebSocket per configured relay, publish-to-all, persistent
//!   subscriptions with cross-relay deduplication, and one-shot point queries.
//! - **Dispatch**: the job correlation layer — publish a signed job request,
//!   watch the feedback stream for the matching status events, fetch the
//!   paired result on success, and resolve the caller's pending future.

pub mod dispatch;
pub mod error;
pub mod pool;

pub use dispatch::JobDispatcher;
pub use error::RelayError;
pub use pool::{RelayPool, Subscription};
