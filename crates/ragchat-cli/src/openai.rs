//! Chat-completion client.
//!
//! Talks to an OpenAI-compatible `/chat/completions` endpoint. One-shot
//! completions for retrieval-query generation; server-sent-event streaming for
//! the final answer so tokens print as they arrive.

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ragchat_core::ChatMessage;

#[derive(Debug, Error)]
pub enum ChatApiError {
    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,

    #[error("Chat API returned no choices")]
    EmptyResponse,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("Malformed stream chunk: {0}")]
    MalformedChunk(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Deserialize)]
struct Delta {
    content: Option<String>,
}

/// The `data:` payload of one SSE line, if it is a data line.
fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

/// The token carried by one SSE data payload. `None` for `[DONE]` and for
/// chunks with no content delta (role announcements, finish markers).
fn delta_content(data: &str) -> Result<Option<String>, ChatApiError> {
    if data == "[DONE]" {
        return Ok(None);
    }
    let chunk: StreamChunk = serde_json::from_str(data)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content))
}

/// Client for an OpenAI-compatible chat-completion API.
pub struct ChatClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl ChatClient {
    /// Build a client; the API key comes from `OPENAI_API_KEY`.
    pub fn new(api_base: impl Into<String>, model: impl Into<String>) -> Result<Self, ChatApiError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| ChatApiError::MissingApiKey)?;
        Ok(Self {
            http: reqwest::Client::new(),
            api_base: api_base.into(),
            api_key,
            model: model.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    /// One-shot completion; returns the first choice's trimmed content.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ChatApiError> {
        let response: CompletionResponse = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&CompletionRequest {
                model: &self.model,
                messages,
                stream: false,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or(ChatApiError::EmptyResponse)
    }

    /// Streaming completion: `on_token` is called for every content delta as
    /// it arrives; returns the assembled response.
    pub async fn complete_streaming(
        &self,
        messages: &[ChatMessage],
        mut on_token: impl FnMut(&str),
    ) -> Result<String, ChatApiError> {
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&CompletionRequest {
                model: &self.model,
                messages,
                stream: true,
            })
            .send()
            .await?
            .error_for_status()?;

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut answer = String::new();

        while let Some(bytes) = stream.next().await {
            buffer.push_str(&String::from_utf8_lossy(&bytes?));
            // SSE events are newline-delimited; a partial line stays buffered.
            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim_end_matches('\r').to_string();
                buffer.drain(..=newline);
                let Some(data) = sse_data(&line) else {
                    continue;
                };
                if data == "[DONE]" {
                    return Ok(answer);
                }
                if let Some(token) = delta_content(data)? {
                    answer.push_str(&token);
                    on_token(&token);
                }
            }
        }
        Ok(answer)
    }
}
