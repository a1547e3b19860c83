//! `ragchat` CLI
//!
//! The interactive assistant: a line-oriented chat loop that augments every
//! answer with context fetched through a retrieval job on the relay network.

pub mod chat;
pub mod openai;
pub mod prompts;

pub use chat::ChatSession;
pub use openai::{ChatApiError, ChatClient};
