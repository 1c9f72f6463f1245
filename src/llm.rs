use std::collections::VecDeque;
use std::fmt::Display;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::Duration;
use tracing::{debug, warn};

use crate::conversation::{wire_messages, Turn, WireMessage};
use crate::error::{ChatError, Result};
use crate::generation::GenerationConfig;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Lazy, finite sequence of reply fragments for one request. It is consumed by
/// value, so a finished or failed stream cannot be replayed.
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Remote completion service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Start one streaming completion for the full turn history.
    ///
    /// `Err` means the request never produced a body (transport failure or a
    /// non-success status). Failures after that arrive as an `Err` item inside
    /// the stream, after which the stream ends.
    async fn stream_completion(
        &self,
        turns: &[Turn],
        config: &GenerationConfig,
    ) -> Result<FragmentStream>;
}

/// Body of a `/chat/completions` request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

impl ChatCompletionRequest {
    pub fn new(turns: &[Turn], config: &GenerationConfig) -> Self {
        Self {
            model: config.model().id().to_string(),
            messages: wire_messages(turns),
            temperature: config.temperature(),
            max_tokens: config.max_tokens(),
            stream: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl ApiError {
    fn describe(&self) -> String {
        match &self.kind {
            Some(kind) if !self.message.is_empty() => format!("{} ({})", self.message, kind),
            Some(kind) => kind.clone(),
            None => self.message.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ApiError,
}

/// OpenAI-compatible streaming chat-completion client.
#[derive(Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ChatError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn stream_completion(
        &self,
        turns: &[Turn],
        config: &GenerationConfig,
    ) -> Result<FragmentStream> {
        let payload = ChatCompletionRequest::new(turns, config);
        let url = self.endpoint();
        debug!(
            url = %url,
            model = %payload.model,
            messages = payload.messages.len(),
            temperature = payload.temperature,
            max_tokens = payload.max_tokens,
            "sending chat completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(%status, "completion service rejected request");
            return Err(ChatError::request(describe_http_error(status, &error_text)));
        }

        Ok(fragment_stream(response.bytes_stream()))
    }
}

fn describe_http_error(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => format!("HTTP {}: {}", status, parsed.error.describe()),
        Err(_) if body.trim().is_empty() => format!("HTTP {}", status),
        Err(_) => format!("HTTP {}: {}", status, body.trim()),
    }
}

/// One decoded Server-Sent Events line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Incremental SSE line decoder.
///
/// Lines are split on raw bytes before any UTF-8 decoding, so a multi-byte
/// character split across two network chunks survives intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every event completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            if let Some(event) = Self::parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing line that arrived without a newline.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let line = std::mem::take(&mut self.buffer);
        Self::parse_line(&line).into_iter().collect()
    }

    fn parse_line(line: &[u8]) -> Option<SseEvent> {
        let text = String::from_utf8_lossy(line);
        let text = text.trim();
        let data = text.strip_prefix("data:")?.trim_start();

        if data.is_empty() {
            None
        } else if data == "[DONE]" {
            Some(SseEvent::Done)
        } else {
            Some(SseEvent::Data(data.to_string()))
        }
    }
}

/// Turn one `data:` payload into an optional fragment.
pub fn decode_chunk(data: &str) -> Result<Option<String>> {
    let chunk: ChatCompletionChunk = serde_json::from_str(data)
        .map_err(|e| ChatError::request(format!("malformed stream chunk: {e}")))?;

    if let Some(error) = chunk.error {
        return Err(ChatError::request(error.describe()));
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

struct StreamDriver {
    body: BoxStream<'static, Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String>>,
    finished: bool,
}

impl StreamDriver {
    fn enqueue(&mut self, events: Vec<SseEvent>) {
        for event in events {
            match event {
                SseEvent::Done => {
                    self.finished = true;
                    return;
                }
                SseEvent::Data(data) => match decode_chunk(&data) {
                    Ok(Some(fragment)) => self.pending.push_back(Ok(fragment)),
                    Ok(None) => {}
                    Err(err) => {
                        self.pending.push_back(Err(err));
                        self.finished = true;
                        return;
                    }
                },
            }
        }
    }
}

/// Wrap a raw SSE byte stream into a [`FragmentStream`].
///
/// Nothing is read from `body` until the returned stream is polled. The stream
/// ends at `[DONE]`, at the end of the body, or right after the first error.
pub fn fragment_stream<S, B, E>(body: S) -> FragmentStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + 'static,
    E: Display + 'static,
{
    let body = body
        .map(|chunk| {
            chunk
                .map(|bytes| bytes.as_ref().to_vec())
                .map_err(|e| ChatError::request(e.to_string()))
        })
        .boxed();

    let driver = StreamDriver {
        body,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(driver, |mut driver| async move {
        loop {
            if let Some(item) = driver.pending.pop_front() {
                return Some((item, driver));
            }
            if driver.finished {
                return None;
            }

            match driver.body.next().await {
                Some(Ok(bytes)) => {
                    let events = driver.decoder.push(&bytes);
                    driver.enqueue(events);
                }
                Some(Err(err)) => {
                    driver.pending.push_back(Err(err));
                    driver.finished = true;
                }
                None => {
                    let events = driver.decoder.finish();
                    driver.enqueue(events);
                    driver.finished = true;
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Conversation;
    use crate::generation::Model;

    fn chunk(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"index": 0, "delta": {"content": content}}]})
        )
    }

    async fn collect(parts: Vec<std::result::Result<Vec<u8>, String>>) -> Vec<Result<String>> {
        fragment_stream(stream::iter(parts)).collect().await
    }

    #[test]
    fn request_body_has_expected_shape() {
        let mut conversation = Conversation::seeded("hi");
        conversation.append(Turn::user("Hello"));
        let config = GenerationConfig::new(Model::Gpt4oMini, 0.5, 512).unwrap();

        let body = serde_json::to_value(ChatCompletionRequest::new(conversation.all(), &config)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "assistant", "content": "hi"},
                    {"role": "user", "content": "Hello"}
                ],
                "temperature": 0.5,
                "max_tokens": 512,
                "stream": true
            })
        );
    }

    #[test]
    fn decoder_handles_lines_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert_eq!(
            decoder.push(b":1}\n\ndata: [DONE]\n"),
            vec![SseEvent::Data("{\"a\":1}".to_string()), SseEvent::Done]
        );
    }

    #[test]
    fn decoder_ignores_comments_and_other_fields() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\nevent: message\nid: 4\n\r\ndata:{}\r\n");
        assert_eq!(events, vec![SseEvent::Data("{}".to_string())]);
    }

    #[test]
    fn decoder_keeps_multibyte_characters_split_across_chunks() {
        let line = chunk("héllo 🚀");
        let bytes = line.as_bytes();
        let rocket = line.find('🚀').unwrap();

        let mut decoder = SseDecoder::new();
        let mut events = decoder.push(&bytes[..rocket + 2]);
        events.extend(decoder.push(&bytes[rocket + 2..]));

        let SseEvent::Data(data) = &events[0] else {
            panic!("expected data event");
        };
        assert_eq!(decode_chunk(data).unwrap().as_deref(), Some("héllo 🚀"));
    }

    #[test]
    fn decoder_flushes_unterminated_last_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish(), vec![SseEvent::Done]);
    }

    #[test]
    fn decode_chunk_skips_empty_and_role_only_deltas() {
        assert_eq!(
            decode_chunk(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            None
        );
        assert_eq!(
            decode_chunk(r#"{"choices":[{"delta":{"content":""},"finish_reason":null}]}"#).unwrap(),
            None
        );
        assert_eq!(
            decode_chunk(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#).unwrap(),
            None
        );
        assert_eq!(decode_chunk(r#"{"choices":[]}"#).unwrap(), None);
    }

    #[test]
    fn decode_chunk_reports_errors() {
        let err = decode_chunk(r#"{"error":{"message":"Rate limit reached","type":"requests"}}"#)
            .unwrap_err();
        assert_eq!(
            err,
            ChatError::request("Rate limit reached (requests)")
        );

        let err = decode_chunk("{not json").unwrap_err();
        assert!(matches!(err, ChatError::CompletionRequestFailed(msg) if msg.starts_with("malformed stream chunk")));
    }

    #[test]
    fn http_errors_use_service_message_when_available() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(
            describe_http_error(reqwest::StatusCode::UNAUTHORIZED, body),
            "HTTP 401 Unauthorized: Incorrect API key provided (invalid_request_error)"
        );
        assert_eq!(
            describe_http_error(reqwest::StatusCode::BAD_GATEWAY, "  "),
            "HTTP 502 Bad Gateway"
        );
        assert_eq!(
            describe_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down"),
            "HTTP 429 Too Many Requests: slow down"
        );
    }

    #[tokio::test]
    async fn stream_yields_fragments_until_done() {
        let body = format!("{}{}data: [DONE]\n\n{}", chunk("Hel"), chunk("lo"), chunk("ignored"));
        let items = collect(vec![Ok(body.into_bytes())]).await;
        assert_eq!(items, vec![Ok("Hel".to_string()), Ok("lo".to_string())]);
    }

    #[tokio::test]
    async fn stream_ends_cleanly_without_done_marker() {
        let items = collect(vec![Ok(chunk("a").into_bytes()), Ok(chunk("b").into_bytes())]).await;
        assert_eq!(items, vec![Ok("a".to_string()), Ok("b".to_string())]);
    }

    #[tokio::test]
    async fn stream_stops_after_transport_error() {
        let items = collect(vec![
            Ok(chunk("partial").into_bytes()),
            Err("connection reset".to_string()),
            Ok(chunk("never").into_bytes()),
        ])
        .await;
        assert_eq!(
            items,
            vec![
                Ok("partial".to_string()),
                Err(ChatError::request("connection reset"))
            ]
        );
    }

    #[tokio::test]
    async fn stream_stops_after_malformed_chunk() {
        let body = format!("{}data: oops\n\n{}", chunk("ok"), chunk("never"));
        let items = collect(vec![Ok(body.into_bytes())]).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok("ok".to_string()));
        assert!(items[1].is_err());
    }
}
