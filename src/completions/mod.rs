
use async_stream::try_stream;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::{RagError, Result};

/// Who authored a message in a completion request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Developer,
    User,
    Assistant,
}

/// One message in the ordered list sent to the completion provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn developer(content: impl Into<String>) -> Self {
        Self {
            role: Role::Developer,
            content: content.into(),
        }
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Lazy sequence of completion text fragments
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
///
/// Only the streaming call path exists; callers consume the fragment stream
/// to completion before acting on the response.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

impl ChatClient {
    #[inline]
    pub fn new(
        provider: &ProviderConfig,
        http: reqwest::Client,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: provider.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Request a streamed completion and return the fragment stream.
    ///
    /// Provider events arrive as `data:` lines; the stream ends at the
    /// `[DONE]` marker. Transport or parse failures surface as an `Err`
    /// item and terminate the stream.
    #[inline]
    pub async fn stream_complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<FragmentStream> {
        let request = ChatCompletionRequest {
            model,
            messages,
            stream: true,
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!("Requesting streamed completion from {} ({model})", url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::CompletionProvider(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::CompletionProvider(format!(
                "completion request failed with status {status}: {body}"
            )));
        }

        let mut bytes = response.bytes_stream();
        let fragments = try_stream! {
            // Buffer raw bytes and cut at newlines; a provider chunk can end
            // mid-line or mid-code-point, but a complete line never does.
            let mut buffer: Vec<u8> = Vec::new();
            let mut done = false;
            while !done {
                let Some(part) = bytes.next().await else {
                    break;
                };
                let part = part.map_err(|e| {
                    RagError::CompletionProvider(format!("error reading completion stream: {e}"))
                })?;
                buffer.extend_from_slice(&part);

                while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
                    let line_bytes: Vec<u8> = buffer.drain(..=newline).collect();
                    let line = String::from_utf8_lossy(&line_bytes);
                    let Some(data) = line.trim().strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        done = true;
                        break;
                    }
                    let event: StreamChunk = serde_json::from_str(data).map_err(|e| {
                        RagError::CompletionProvider(format!("malformed stream event: {e}"))
                    })?;
                    let content = event
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.delta.content);
                    if let Some(fragment) = content {
                        if !fragment.is_empty() {
                            yield fragment;
                        }
                    }
                }
            }
        };

        Ok(fragments.boxed())
    }
}
