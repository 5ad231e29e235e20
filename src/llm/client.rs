use async_stream::try_stream;
use futures_util::{Stream, StreamExt};
use reqwest::{Client, Response};
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use super::types::{ChatCompletionChunk, ChatCompletionResponse, ChatRequest};
use crate::config::{LlmConfig, RequestConfig};
use crate::error::{LlmError, LlmResult};

/// Stream of text deltas from a streaming completion
pub type TextStream = Pin<Box<dyn Stream<Item = LlmResult<String>> + Send>>;

/// Client for an OpenAI-compatible chat completions API
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: String,
    request_config: RequestConfig,
}

impl LlmClient {
    /// Create a new client
    pub fn new(
        api_key: impl Into<String>,
        base_url: &str,
        request_config: RequestConfig,
    ) -> LlmResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(LlmError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            request_config,
        })
    }

    /// Build a client from configuration. `None` when no API key is set.
    pub fn from_config(config: &LlmConfig, request_config: RequestConfig) -> LlmResult<Option<Self>> {
        config
            .api_key
            .as_deref()
            .map(|key| Self::new(key, &config.base_url, request_config))
            .transpose()
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run a completion and return the first choice's trimmed content
    pub async fn complete(&self, request: ChatRequest) -> LlmResult<String> {
        let start = Instant::now();
        let model = request.model.clone();

        let response = self.send(&ChatRequest {
            stream: false,
            ..request
        })
        .await
        .inspect_err(|e| error!(model = %model, error = %e, "Chat completion failed"))?;

        let body: ChatCompletionResponse =
            response
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponse {
                    message: format!("Failed to parse completion response: {}", e),
                })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(LlmError::EmptyCompletion)?;

        info!(
            model = %model,
            served_model = body.model.as_deref().unwrap_or("unknown"),
            latency_ms = start.elapsed().as_millis(),
            "Chat completion succeeded"
        );

        Ok(content)
    }

    /// Run a streaming completion, yielding text deltas as they arrive
    pub async fn stream(&self, request: ChatRequest) -> LlmResult<TextStream> {
        let model = request.model.clone();
        let response = self
            .send(&ChatRequest {
                stream: true,
                ..request
            })
            .await
            .inspect_err(|e| error!(model = %model, error = %e, "Chat stream failed to start"))?;

        let mut bytes = response.bytes_stream();

        let stream = try_stream! {
            let mut buffer: Vec<u8> = Vec::new();

            'read: while let Some(chunk) = bytes.next().await {
                buffer.extend_from_slice(&chunk?);

                // Lines are decoded whole so multi-byte characters never split
                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    match parse_sse_line(&String::from_utf8_lossy(&line)) {
                        SseEvent::Done => {
                            // Nothing after the terminator is part of the reply
                            buffer.clear();
                            break 'read;
                        }
                        SseEvent::Delta(text) => yield text,
                        SseEvent::Ignore => {}
                    }
                }
            }

            if let SseEvent::Delta(text) = parse_sse_line(&String::from_utf8_lossy(&buffer)) {
                yield text;
            }

            debug!(model = %model, "Chat stream finished");
        };

        Ok(Box::pin(stream))
    }

    async fn send(&self, request: &ChatRequest) -> LlmResult<Response> {
        let url = format!("{}/chat/completions", self.base_url);

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            stream = request.stream,
            "Calling chat completions"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    LlmError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        Ok(response)
    }
}

/// Decoded server-sent event line
#[derive(Debug, PartialEq)]
enum SseEvent {
    Delta(String),
    Done,
    Ignore,
}

fn parse_sse_line(line: &str) -> SseEvent {
    let Some(payload) = line.trim().strip_prefix("data:") else {
        return SseEvent::Ignore;
    };
    let payload = payload.trim();

    if payload == "[DONE]" {
        return SseEvent::Done;
    }

    match serde_json::from_str::<ChatCompletionChunk>(payload) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|text| !text.is_empty())
            .map(SseEvent::Delta)
            .unwrap_or(SseEvent::Ignore),
        Err(e) => {
            debug!(error = %e, "Skipping unparseable stream event");
            SseEvent::Ignore
        }
    }
}
