//! Chat history and prompt rendering.
//!
//! The history holds user/assistant turns; the system prompt is rendered on
//! demand with the latest retrieval context substituted for `%CONTEXT%`.

use serde::{Deserialize, Serialize};

/// Placeholder replaced with the retrieval context in the system template.
pub const CONTEXT_PLACEHOLDER: &str = "%CONTEXT%";

/// Message roles for the chat-completion API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A running conversation with a templated system prompt.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    system_template: String,
    turns: Vec<ChatMessage>,
}

impl ChatHistory {
    /// Create a history whose system prompt contains `%CONTEXT%`.
    pub fn new(system_template: impl Into<String>) -> Self {
        Self {
            system_template: system_template.into(),
            turns: Vec::new(),
        }
    }

    /// Append a user turn.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(ChatMessage::new(Role::User, content));
    }

    /// Append an assistant turn.
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(ChatMessage::new(Role::Assistant, content));
    }

    /// Number of user/assistant turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The full message list for the chat API: rendered system prompt first,
    /// then every turn.
    pub fn with_context(&self, context: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.turns.len() + 1);
        messages.push(ChatMessage::new(
            Role::System,
            self.system_template.replace(CONTEXT_PLACEHOLDER, context),
        ));
        messages.extend(self.turns.iter().cloned());
        messages
    }

    /// Render the last `n` turns as `role: content` lines, oldest first.
    ///
    /// Feeds the retrieval prompt; the system prompt is never included.
    pub fn render_recent(&self, n: usize) -> String {
        let start = self.turns.len().saturating_sub(n);
        let mut rendered = String::new();
        for turn in &self.turns[start..] {
            rendered.push_str(turn.role.as_str());
            rendered.push_str(": ");
            rendered.push_str(&turn.content);
            rendered.push('\n');
        }
        rendered
    }
}
