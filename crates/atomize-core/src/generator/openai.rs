//! OpenAI-compatible chat-completions transport.
//!
//! Issues a `"stream": true` request and converts the SSE response into a
//! [`FragmentStream`] of content deltas. SSE lines can be split across HTTP
//! chunks, so raw bytes go through a [`LineBuffer`] before parsing.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest::header::{self, HeaderMap, HeaderValue};

use crate::extractor::LineBuffer;

use super::{FragmentStream, Generator, GeneratorError};

/// Settings for the chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// API root, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Model name sent with every request.
    pub model: String,
    /// Bearer token.
    pub api_key: String,
}

impl GeneratorConfig {
    /// Config pointing at the hosted OpenAI API with the default model.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_owned(),
            model: "gpt-4o-mini".to_owned(),
            api_key: api_key.into(),
        }
    }
}

/// Production [`Generator`] backed by an OpenAI-compatible HTTP API.
pub struct OpenAiGenerator {
    client: Client,
    config: GeneratorConfig,
}

impl OpenAiGenerator {
    /// Build the transport. Only the connect phase is bounded here; overall
    /// stream duration is enforced by the session deadline.
    pub fn new(config: GeneratorConfig) -> Result<Self, GeneratorError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| {
                GeneratorError::Config("API key contains invalid header characters".to_owned())
            })?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn stream(&self, prompt: &str) -> Result<FragmentStream, GeneratorError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": prompt}],
            "stream": true,
        });

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = api_error_message(response).await;
            return Err(GeneratorError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let mut chunks = response.bytes_stream();
        let fragments = async_stream::stream! {
            let mut carry = LineBuffer::new();
            while let Some(chunk) = chunks.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(error) => {
                        yield Err(GeneratorError::Request(error));
                        return;
                    }
                };
                carry.push(&String::from_utf8_lossy(&bytes));
                while let Some(line) = carry.next_line() {
                    match parse_sse_line(&line) {
                        SsePayload::Content(text) => yield Ok(text),
                        SsePayload::Done => return,
                        SsePayload::Skip => {}
                    }
                }
            }
        };

        Ok(Box::pin(fragments))
    }
}

/// Result of parsing one SSE line.
#[derive(Debug, PartialEq)]
enum SsePayload {
    /// A content delta to forward.
    Content(String),
    /// The `[DONE]` sentinel: the stream is over.
    Done,
    /// Keep-alives, role-only deltas, anything without content.
    Skip,
}

/// Parse one line of the chat-completions SSE body.
fn parse_sse_line(line: &str) -> SsePayload {
    let Some(data) = line.trim().strip_prefix("data: ") else {
        return SsePayload::Skip;
    };
    if data.trim() == "[DONE]" {
        return SsePayload::Done;
    }
    let Ok(chunk) = serde_json::from_str::<serde_json::Value>(data) else {
        return SsePayload::Skip;
    };

    match chunk["choices"][0]["delta"]["content"].as_str() {
        Some(content) if !content.is_empty() => SsePayload::Content(content.to_owned()),
        _ => SsePayload::Skip,
    }
}

/// Pull a readable message out of an error response body.
async fn api_error_message(response: reqwest::Response) -> String {
    let Ok(body) = response.text().await else {
        return "no error body".to_owned();
    };
    serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_owned))
        .unwrap_or(body)
}
