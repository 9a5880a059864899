//! LLM Client — the single point of entry for all model calls in Allivo.
//!
//! ARCHITECTURAL RULE: no other module may call the OpenAI API directly.
//! All model interactions MUST go through this module.
//!
//! Three call shapes: `call` for prose replies, `call_json` for structured
//! output (extraction, suggestions), and `call_stream` for the incremental
//! conversational reply.

use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
/// The model used for all calls. Intentionally hardcoded to prevent drift.
pub const MODEL: &str = "gpt-4o";
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Token usage reported by the API. Persisted in assistant message metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Full result of a non-streamed call.
#[derive(Debug)]
pub struct LlmResponse {
    pub text: String,
    pub finish_reason: Option<String>,
    pub usage: Usage,
}

/// Result of a streamed call. `completed` is false when the consumer
/// requested an early stop (client disconnect) before the stream finished.
#[derive(Debug)]
pub struct StreamedReply {
    pub text: String,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
    pub completed: bool,
}

// Streaming wire chunks — the JSON payloads of `data:` lines.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// The single LLM client used by all services in Allivo.
/// Wraps the chat-completions API with retry logic and structured output
/// helpers.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
}

impl LlmClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    /// Makes a non-streamed call and returns the full text response.
    /// Retries on 429 and 5xx with exponential backoff.
    pub async fn call(&self, prompt: &str, system: &str) -> Result<LlmResponse, LlmError> {
        let response = self
            .send_with_retries(prompt, system, CallMode::Prose)
            .await?;
        let parsed: ChatResponse = response.json().await?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyContent)?;
        let text = choice.message.content.clone().filter(|c| !c.is_empty());
        let text = text.ok_or(LlmError::EmptyContent)?;

        let usage = parsed.usage.unwrap_or_default();
        debug!(
            "LLM call succeeded: prompt_tokens={}, completion_tokens={}",
            usage.prompt_tokens, usage.completion_tokens
        );

        Ok(LlmResponse {
            text,
            finish_reason: choice.finish_reason,
            usage,
        })
    }

    /// Calls the model in JSON mode and deserializes the response.
    /// The prompt must instruct the model to return a JSON object.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<T, LlmError> {
        let response = self
            .send_with_retries(prompt, system, CallMode::Json)
            .await?;
        let parsed: ChatResponse = response.json().await?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or(LlmError::EmptyContent)?;

        // JSON mode should not produce fences, but strip them if it does.
        let text = strip_json_fences(&text);
        serde_json::from_str(text).map_err(LlmError::Parse)
    }

    /// Streams a reply, invoking `on_delta` for each text fragment as it
    /// arrives. When `on_delta` returns false the stream is abandoned (the
    /// caller went away) and the partial reply is returned with
    /// `completed = false`.
    pub async fn call_stream<F>(
        &self,
        prompt: &str,
        system: &str,
        mut on_delta: F,
    ) -> Result<StreamedReply, LlmError>
    where
        F: FnMut(&str) -> bool,
    {
        let response = self
            .send_with_retries(prompt, system, CallMode::Stream)
            .await?;

        let mut body = response.bytes_stream();
        let mut parser = SseLineParser::new();
        let mut reply = StreamedReply {
            text: String::new(),
            finish_reason: None,
            usage: None,
            completed: false,
        };

        'read: while let Some(chunk) = body.next().await {
            let chunk: Bytes = chunk?;
            for payload in parser.push(&chunk) {
                if payload == "[DONE]" {
                    reply.completed = true;
                    break 'read;
                }
                let parsed: StreamChunk = match serde_json::from_str(&payload) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("Skipping malformed stream chunk: {e}");
                        continue;
                    }
                };
                if let Some(usage) = parsed.usage {
                    reply.usage = Some(usage);
                }
                for choice in parsed.choices {
                    if let Some(content) = choice.delta.content {
                        reply.text.push_str(&content);
                        if !on_delta(&content) {
                            break 'read;
                        }
                    }
                    if let Some(reason) = choice.finish_reason {
                        reply.finish_reason = Some(reason);
                    }
                }
            }
        }

        if reply.completed && reply.text.is_empty() {
            return Err(LlmError::EmptyContent);
        }
        Ok(reply)
    }

    /// Sends the request, retrying on connection errors, 429, and 5xx.
    /// Returns the successful, still-unconsumed response.
    async fn send_with_retries(
        &self,
        prompt: &str,
        system: &str,
        mode: CallMode,
    ) -> Result<reqwest::Response, LlmError> {
        let request_body = ChatRequest {
            model: MODEL,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            response_format: matches!(mode, CallMode::Json).then_some(ResponseFormat {
                format_type: "json_object",
            }),
            stream: matches!(mode, CallMode::Stream).then_some(true),
            stream_options: matches!(mode, CallMode::Stream)
                .then_some(StreamOptions { include_usage: true }),
        };

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(OPENAI_API_URL)
                .bearer_auth(&self.api_key)
                .header("content-type", "application/json")
                .json(&request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                // Try to parse the API's error message
                let message = serde_json::from_str::<ApiError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            return Ok(response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

#[derive(Debug, Clone, Copy)]
enum CallMode {
    Prose,
    Json,
    Stream,
}

/// Incremental parser for the `data:`-prefixed lines of a streamed
/// chat-completions response. Buffers partial lines across body chunks.
struct SseLineParser {
    buffer: String,
}

impl SseLineParser {
    fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    /// Feeds a body chunk and returns the complete `data:` payloads found.
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut payloads = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            if let Some(payload) = parse_sse_data_line(line.trim_end()) {
                payloads.push(payload.to_string());
            }
        }
        payloads
    }
}

/// Returns the payload of a `data:` line, or `None` for blanks and comments.
fn parse_sse_data_line(line: &str) -> Option<&str> {
    line.strip_prefix("data:")
        .map(str::trim_start)
        .filter(|p| !p.is_empty())
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_parse_sse_data_line() {
        assert_eq!(parse_sse_data_line("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(parse_sse_data_line("data: [DONE]"), Some("[DONE]"));
        assert_eq!(parse_sse_data_line(""), None);
        assert_eq!(parse_sse_data_line(": keep-alive"), None);
    }

    #[test]
    fn test_sse_parser_buffers_partial_lines() {
        let mut parser = SseLineParser::new();
        assert!(parser.push(b"data: {\"cho").is_empty());
        let payloads = parser.push(b"ices\":[]}\n\ndata: [DONE]\n");
        assert_eq!(payloads, vec!["{\"choices\":[]}", "[DONE]"]);
    }

    #[test]
    fn test_stream_chunk_parses_delta_and_usage() {
        let chunk: StreamChunk = serde_json::from_str(
            r#"{"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hel"));

        let last: StreamChunk = serde_json::from_str(
            r#"{"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":34,"total_tokens":46}}"#,
        )
        .unwrap();
        assert_eq!(last.usage.unwrap().total_tokens, 46);
    }

    #[test]
    fn test_chat_response_parses_choice() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{
                "choices": [{"message": {"content": "hello"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 1, "completion_tokens": 2, "total_tokens": 3}
            }"#,
        )
        .unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("hello"));
        assert_eq!(parsed.usage.unwrap().total_tokens, 3);
    }
}
