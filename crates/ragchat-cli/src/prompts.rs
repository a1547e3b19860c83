//! Prompt templates.
//!
//! Two prompts drive the pipeline: the answer prompt, rendered with the latest
//! retrieval context, and the retrieval prompt, rendered with recent history to
//! produce a standalone search query.

use ragchat_core::{ChatHistory, ChatMessage, Role};

/// Printed once at startup.
pub const WELCOME: &str = "Ask me anything about jMonkeyEngine\n   \
    Enter d for debug mode.\n   \
    Enter q to exit.\n   \
    Enter w to pre-warm the dataset.\n   \
    Enter e to toggle encryption (off by default)";

/// System prompt for the final answer; `%CONTEXT%` is substituted at call
/// time.
pub const ANSWER_TEMPLATE: &str = "\
You are the jMonkeyEngine chat assistant.
Answer the user with short concise answers using code samples when possible.
You can use the following CONTEXT to help you answer the user's questions.

CONTEXT:
%CONTEXT%


";

/// Placeholder replaced with the rendered recent turns.
pub const HISTORY_PLACEHOLDER: &str = "%HISTORY%";

/// Prompt that condenses the conversation into one standalone question.
pub const RETRIEVAL_TEMPLATE: &str = "\
Given the following chat history between user and assistant, \
answer with a fully qualified standalone and short question that summarizes the user's question. \
If no lookup is needed, answer with NOP.

CHAT HISTORY:
%HISTORY%

FULLY QUALIFIED QUESTION: ";

/// Sentinel answer meaning the model decided no retrieval is needed.
pub const SKIP_RETRIEVAL: &str = "NOP";

/// How many recent turns feed the retrieval prompt.
pub const RECENT_TURNS: usize = 10;

/// The single-message conversation that asks for a standalone query.
pub fn retrieval_messages(history: &ChatHistory) -> Vec<ChatMessage> {
    let rendered = history.render_recent(RECENT_TURNS);
    vec![ChatMessage::new(
        Role::System,
        RETRIEVAL_TEMPLATE.replace(HISTORY_PLACEHOLDER, &rendered),
    )]
}
