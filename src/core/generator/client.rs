//! HTTP client for the LLM completions endpoint.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use tracing::debug;

use super::config::InferenceConfig;
use super::messages::{CompletionRequest, CompletionResponse, SseDecoder, SseEvent};
use super::{TextStream, TokenSource};
use crate::errors::{SynthesisError, SynthesisResult};

/// Completions client supporting SSE streaming and single-shot responses
#[derive(Debug, Clone)]
pub struct LlmClient {
    config: InferenceConfig,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: InferenceConfig) -> SynthesisResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                SynthesisError::InferenceUnavailable(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }
}

#[async_trait]
impl TokenSource for LlmClient {
    fn streaming(&self) -> bool {
        self.config.streaming
    }

    fn model(&self) -> Option<String> {
        self.config.model.clone()
    }

    async fn complete(&self, request: CompletionRequest) -> SynthesisResult<TextStream> {
        debug!(
            url = %self.config.url,
            stream = request.stream,
            max_tokens = request.max_tokens,
            "Completion request"
        );

        let mut builder = self.client.post(&self.config.url).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        if !request.stream {
            let body: CompletionResponse = response.json().await.map_err(|e| {
                if e.is_decode() {
                    SynthesisError::TokenStreamCorrupt(format!("Failed to parse response: {e}"))
                } else {
                    transport_error(e)
                }
            })?;
            let text = body.into_text()?;
            return Ok(Box::pin(futures::stream::once(async move { Ok(text) })));
        }

        let mut body = response.bytes_stream();
        Ok(Box::pin(async_stream::stream! {
            let mut decoder = SseDecoder::new();
            while let Some(bytes) = body.next().await {
                let bytes = match bytes {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(transport_error(e));
                        return;
                    }
                };
                match decoder.push(&bytes) {
                    Ok(events) => {
                        for event in events {
                            match event {
                                SseEvent::Text(text) => yield Ok(text),
                                SseEvent::Done => return,
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
            match decoder.finish() {
                Ok(Some(SseEvent::Text(text))) => yield Ok(text),
                Ok(_) => {}
                Err(e) => yield Err(e),
            }
        }))
    }
}

/// Network level failures are always retryable.
fn transport_error(e: reqwest::Error) -> SynthesisError {
    let kind = if e.is_timeout() {
        "timed out"
    } else if e.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    SynthesisError::InferenceUnavailable(format!("Inference {kind}: {e}"))
}

fn status_error(status: StatusCode, body: &str) -> SynthesisError {
    let message = format!("Inference endpoint returned {status}: {body}");
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        SynthesisError::InferenceUnavailable(message)
    } else {
        SynthesisError::TokenStreamCorrupt(message)
    }
}
