//! Wire types for the OpenAI-compatible completions endpoint.

use serde::{Deserialize, Serialize};

use super::config::SamplingSettings;
use crate::errors::{SynthesisError, SynthesisResult};

/// Prompt conditioning the model on a voice
pub fn format_prompt(voice: &str, text: &str) -> String {
    format!("<|audio|>{voice}: {text}<|eot_id|>")
}

/// Completions request body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
    pub stream: bool,
}

impl CompletionRequest {
    pub fn new(
        voice: &str,
        text: &str,
        settings: &SamplingSettings,
        model: Option<String>,
        stream: bool,
    ) -> Self {
        Self {
            model,
            prompt: format_prompt(voice, text),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            top_p: settings.top_p,
            repetition_penalty: settings.repetition_penalty,
            stream,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChoice {
    #[serde(default)]
    pub text: String,
}

/// Completions response body, or one SSE event payload
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    pub choices: Vec<CompletionChoice>,
}

impl CompletionResponse {
    pub fn into_text(self) -> SynthesisResult<String> {
        self.choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .ok_or_else(|| SynthesisError::TokenStreamCorrupt("response has no choices".to_string()))
    }
}

/// One decoded server-sent event line
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Text(String),
    Done,
}

/// Incremental `text/event-stream` decoder for completion chunks
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw body bytes and return the events they complete.
    pub fn push(&mut self, bytes: &[u8]) -> SynthesisResult<Vec<SseEvent>> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = parse_line(&line)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Decode whatever is left once the body ends without a trailing newline.
    pub fn finish(mut self) -> SynthesisResult<Option<SseEvent>> {
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line)
    }
}

fn parse_line(line: &[u8]) -> SynthesisResult<Option<SseEvent>> {
    let line = std::str::from_utf8(line)
        .map_err(|e| SynthesisError::TokenStreamCorrupt(format!("invalid UTF-8 in event stream: {e}")))?
        .trim();

    let Some(data) = line.strip_prefix("data:") else {
        // Comments, event names, ids and blank separators
        return Ok(None);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }

    let chunk: CompletionResponse = serde_json::from_str(data)
        .map_err(|e| SynthesisError::TokenStreamCorrupt(format!("invalid event payload: {e}")))?;
    Ok(Some(SseEvent::Text(chunk.into_text()?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_format() {
        assert_eq!(format_prompt("tara", "Hi."), "<|audio|>tara: Hi.<|eot_id|>");
    }

    #[test]
    fn test_request_skips_missing_model() {
        let settings = SamplingSettings {
            max_tokens: 10,
            temperature: 0.6,
            top_p: 0.9,
            repetition_penalty: 1.1,
        };
        let json = serde_json::to_value(CompletionRequest::new("leo", "x", &settings, None, true)).unwrap();
        assert!(json.get("model").is_none());
        assert_eq!(json["stream"], true);
        assert_eq!(json["max_tokens"], 10);
    }

    #[test]
    fn test_sse_events_across_reads() {
        let mut decoder = SseDecoder::new();
        let events = decoder
            .push(b": keep-alive\n\ndata: {\"choices\":[{\"text\":\"<custom_")
            .unwrap();
        assert!(events.is_empty());

        let events = decoder
            .push(b"token_11>\"}]}\n\ndata: [DONE]\n\n")
            .unwrap();
        assert_eq!(
            events,
            vec![
                SseEvent::Text("<custom_token_11>".to_string()),
                SseEvent::Done
            ]
        );
        assert_eq!(decoder.finish().unwrap(), None);
    }

    #[test]
    fn test_sse_rejects_bad_payload() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {not json}\n").is_err());

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"choices\":[]}\n").is_err());
    }

    #[test]
    fn test_sse_trailing_line_without_newline() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: [DONE]").unwrap().is_empty());
        assert_eq!(decoder.finish().unwrap(), Some(SseEvent::Done));
    }
}
