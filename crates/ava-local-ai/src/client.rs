//! HTTP client for OpenAI-compatible chat completion servers.
//!
//! Used against a local llamafile server (`http://localhost:<port>/v1/`) or a
//! remote API endpoint from the registry.

use std::collections::VecDeque;

use ava_registry::{ModelDescriptor, ModelKind};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// API key sent to local servers, which ignore it.
pub const LOCAL_API_KEY: &str = "dummy";

/// Client for one chat completion endpoint.
pub struct ChatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

/// Stream of completion chunks.
pub type ChunkStream = BoxStream<'static, Result<ChatCompletionChunk, ChatError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Chat message in OpenAI format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Optional sampling parameters; unset fields are left to the server.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatCompletionParams {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(flatten)]
    params: &'a ChatCompletionParams,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// One streamed completion chunk.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub created: Option<u64>,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: ChatDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatDelta {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletionChunk {
    /// Content delta of the first choice.
    pub fn content(&self) -> &str {
        self.choices
            .first()
            .and_then(|c| c.delta.content.as_deref())
            .unwrap_or("")
    }

    /// Finish reason of the first choice, set on the last chunk.
    pub fn finish_reason(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.finish_reason.as_deref())
    }
}

/// Folds streamed chunks into the assistant's reply.
#[derive(Debug, Clone, Default)]
pub struct StreamAccumulator {
    content: String,
    finish_reason: Option<String>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk, returning its content delta.
    pub fn push<'a>(&mut self, chunk: &'a ChatCompletionChunk) -> &'a str {
        let delta = chunk.content();
        self.content.push_str(delta);
        if let Some(reason) = chunk.finish_reason() {
            self.finish_reason = Some(reason.to_string());
        }
        delta
    }

    pub fn is_finished(&self) -> bool {
        self.finish_reason.is_some()
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    pub fn into_message(self) -> ChatMessage {
        ChatMessage::assistant(self.content)
    }
}

impl ChatClient {
    /// Create a client for a base URL such as `http://localhost:8980/v1/`.
    pub fn with_url(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: LOCAL_API_KEY.to_string(),
        }
    }

    /// Create a client for a local server on `port`.
    pub fn with_port(port: u16) -> Self {
        Self::with_url(format!("http://localhost:{}/v1/", port))
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    /// Create a client for a remote-API model. Local models need a port
    /// from the supervisor, so this returns `None` for them.
    pub fn for_remote(model: &ModelDescriptor) -> Option<Self> {
        if model.kind != ModelKind::RemoteApi {
            return None;
        }
        let endpoint = model.api_endpoint.as_deref()?;
        let client = Self::with_url(endpoint);
        Some(match model.api_key.as_deref() {
            Some(key) if !key.is_empty() => client.with_api_key(key),
            _ => client,
        })
    }

    /// Get the base URL, without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check that the server answers `GET /models`.
    pub async fn health(&self) -> Result<(), ChatError> {
        let url = format!("{}/models", self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ChatError::ServerNotRunning(self.base_url.clone()))
        }
    }

    /// Request a complete (non-streamed) reply.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &ChatCompletionParams,
    ) -> Result<ChatMessage, ChatError> {
        let response = self.post(messages, params, false).await?;
        let completion: ChatCompletionResponse = response.json().await?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| ChatMessage::assistant(c.message.content.unwrap_or_default()))
            .ok_or(ChatError::EmptyCompletion)
    }

    /// Request a streamed reply.
    pub async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        params: &ChatCompletionParams,
    ) -> Result<ChunkStream, ChatError> {
        let response = self.post(messages, params, true).await?;
        Ok(chunk_stream(Box::pin(response.bytes_stream())))
    }

    async fn post(
        &self,
        messages: &[ChatMessage],
        params: &ChatCompletionParams,
        stream: bool,
    ) -> Result<reqwest::Response, ChatError> {
        let request = ChatCompletionRequest {
            messages,
            stream,
            params,
        };

        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ChatError::Api(format!("{}: {}", status, text)));
        }

        Ok(response)
    }

    fn map_send_error(&self, e: reqwest::Error) -> ChatError {
        if e.is_connect() || e.is_timeout() {
            ChatError::ServerNotRunning(self.base_url.clone())
        } else {
            ChatError::Http(e)
        }
    }
}

/// Event in a server-sent-events body.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SseEvent {
    Data(String),
    Done,
}

/// Splits an SSE byte stream into `data:` payloads.
#[derive(Debug, Default)]
struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            events.extend(Self::parse_line(&line));
        }
        events
    }

    fn finish(&mut self) -> Vec<SseEvent> {
        let line = std::mem::take(&mut self.buf);
        Self::parse_line(&line).into_iter().collect()
    }

    fn parse_line(line: &[u8]) -> Option<SseEvent> {
        let line = String::from_utf8_lossy(line);
        let payload = line.trim_end_matches(['\r', '\n']).strip_prefix("data:")?;
        let payload = payload.trim_start();
        if payload == "[DONE]" {
            Some(SseEvent::Done)
        } else if payload.is_empty() {
            None
        } else {
            Some(SseEvent::Data(payload.to_string()))
        }
    }
}

struct ChunkState<S> {
    bytes: S,
    decoder: SseDecoder,
    pending: VecDeque<SseEvent>,
    exhausted: bool,
}

fn chunk_stream<S, B>(bytes: S) -> ChunkStream
where
    S: Stream<Item = reqwest::Result<B>> + Unpin + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = ChunkState {
        bytes,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        exhausted: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return match event {
                    SseEvent::Done => None,
                    SseEvent::Data(payload) => {
                        let chunk = serde_json::from_str(&payload).map_err(ChatError::from);
                        Some((chunk, state))
                    }
                };
            }
            if state.exhausted {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(bytes)) => {
                    let events = state.decoder.push(bytes.as_ref());
                    state.pending.extend(events);
                }
                Some(Err(e)) => {
                    state.exhausted = true;
                    return Some((Err(ChatError::Http(e)), state));
                }
                None => {
                    state.exhausted = true;
                    let events = state.decoder.finish();
                    state.pending.extend(events);
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_url() {
        let client = ChatClient::with_port(8980);
        assert_eq!(client.base_url(), "http://localhost:8980/v1");
    }

    #[test]
    fn test_custom_url() {
        let client = ChatClient::with_url("https://api.example.com/v1");
        assert_eq!(client.base_url(), "https://api.example.com/v1");
    }

    #[test]
    fn test_for_remote() {
        let remote = ModelDescriptor::remote("gpt", "GPT", "https://api.example.com/v1/")
            .with_api_key("sk-test");
        let client = ChatClient::for_remote(&remote).unwrap();
        assert_eq!(client.base_url(), "https://api.example.com/v1");
        assert_eq!(client.api_key, "sk-test");

        let local = ModelDescriptor::local("m1", "One", "/m1.gguf");
        assert!(ChatClient::for_remote(&local).is_none());
    }

    #[test]
    fn test_request_body() {
        let messages = vec![ChatMessage::user("hello")];
        let params = ChatCompletionParams {
            temperature: Some(0.5),
            ..Default::default()
        };
        let request = ChatCompletionRequest {
            messages: &messages,
            stream: true,
            params: &params,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], "hello");
        assert_eq!(value["stream"], true);
        assert_eq!(value["model"], "");
        assert_eq!(value["temperature"], 0.5);
        assert!(value.get("max_tokens").is_none());
    }

    #[test]
    fn test_sse_decoder_split_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"id\":").is_empty());
        let events = decoder.push(b"\"a\"}\r\n\r\n: keep-alive\ndata: [DONE]\n");
        assert_eq!(
            events,
            vec![
                SseEvent::Data("{\"id\":\"a\"}".to_string()),
                SseEvent::Done
            ]
        );
    }

    #[test]
    fn test_sse_decoder_trailing_line() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {}").is_empty());
        assert_eq!(decoder.finish(), vec![SseEvent::Data("{}".to_string())]);
        assert!(decoder.finish().is_empty());
    }

    #[tokio::test]
    async fn test_chunk_stream() {
        let body: Vec<reqwest::Result<Vec<u8>>> = vec![
            Ok(b"data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Hel\"}}]}\n\n".to_vec()),
            Ok(b"data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"},\"finish_reason\":null}]}\n\n".to_vec()),
            Ok(b"data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\ndata: [DONE]\n\n".to_vec()),
            Ok(b"data: {\"id\":\"ignored\"}\n\n".to_vec()),
        ];
        let chunks: Vec<_> = chunk_stream(stream::iter(body)).collect().await;
        assert_eq!(chunks.len(), 3);

        let mut acc = StreamAccumulator::new();
        for chunk in &chunks {
            acc.push(chunk.as_ref().unwrap());
        }
        assert!(acc.is_finished());
        assert_eq!(acc.finish_reason(), Some("stop"));
        assert_eq!(acc.into_message(), ChatMessage::assistant("Hello"));

        let first = chunks[0].as_ref().unwrap();
        assert_eq!(first.choices[0].delta.role, Some(Role::Assistant));
    }

    #[tokio::test]
    async fn test_chunk_stream_bad_json() {
        let body: Vec<reqwest::Result<Vec<u8>>> = vec![Ok(b"data: {oops\n".to_vec())];
        let chunks: Vec<_> = chunk_stream(stream::iter(body)).collect().await;
        assert_eq!(chunks.len(), 1);
        assert!(matches!(chunks[0], Err(ChatError::Json(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        // Port 9 (discard) is essentially never serving HTTP locally.
        let client = ChatClient::with_port(9);
        let err = client.health().await.unwrap_err();
        assert!(matches!(err, ChatError::ServerNotRunning(_)));
    }
}
