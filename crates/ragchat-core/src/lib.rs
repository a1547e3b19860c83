//! `ragchat` Core Library
//!
//! Shared functionality for `ragchat` components:
//! - Configuration (relays, provider, documents, chat model)
//! - Chat history and prompt rendering
//! - Tracing initialization with a runtime-reloadable filter
//! - Common error types

pub mod config;
pub mod error;
pub mod history;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use history::{ChatHistory, ChatMessage, Role};
