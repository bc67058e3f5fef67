use std::fmt::Display;
use std::pin::Pin;
use std::time::Duration;

use async_stream::try_stream;
use chrono::Utc;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::chat::{ChatError, Role};
use crate::core::AppConfig;

/// A single entry of the `messages` array sent upstream.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
        }
    }
}

// Upstream frames look like this:
//
// data: {"id":"chatcmpl-1","object":"chat.completion.chunk","created":1694268190,
//        "model":"gpt-4o-mini-2024-07-18","system_fingerprint":"fp_1",
//        "choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}
//
// The first frame usually carries only `{"role":"assistant","content":""}`
// and the last one an empty delta with `finish_reason: "stop"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub delta: Delta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default = "chunk_object")]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
    pub choices: Vec<ChunkChoice>,
}

fn chunk_object() -> String {
    String::from("chat.completion.chunk")
}

impl CompletionChunk {
    /// Text carried by the first choice, if any.
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.delta.content.as_deref())
            .filter(|c| !c.is_empty())
    }

    /// Build a frame that is not part of the model's output but is
    /// shaped exactly like one.
    pub fn synthetic(content: &str, model: &str) -> Self {
        let now = Utc::now();
        Self {
            id: format!("addon-{}", now.timestamp_millis()),
            object: chunk_object(),
            created: now.timestamp(),
            model: model.to_string(),
            system_fingerprint: None,
            choices: vec![ChunkChoice {
                index: 0,
                delta: Delta {
                    content: Some(content.to_string()),
                },
                finish_reason: None,
            }],
        }
    }
}

pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<UpstreamEvent, ChatError>> + Send>>;

#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    /// A frame carrying a non-empty piece of assistant text.
    Fragment { text: String, chunk: CompletionChunk },
    /// The `[DONE]` sentinel, or the body ending.
    Done,
}

/// Interpret the payload of one `data:` line.
///
/// Returns `Ok(None)` for well-formed frames with nothing to relay
/// (role announcements, the final `finish_reason` frame).
pub fn parse_frame(data: &str) -> Result<Option<UpstreamEvent>, ChatError> {
    if data == "[DONE]" {
        return Ok(Some(UpstreamEvent::Done));
    }
    let chunk = serde_json::from_str::<CompletionChunk>(data)
        .map_err(|e| ChatError::MalformedFragment(format!("{e}: {data}")))?;
    Ok(chunk.content().map(str::to_string).map(|text| UpstreamEvent::Fragment {
        text,
        chunk,
    }))
}

/// Incremental server-sent-events decoder.
///
/// Bytes are buffered rather than decoded per network chunk since a
/// chunk boundary can land in the middle of an event or of a multi
/// byte character.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return the `data` payload of every event they
    /// complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some((end, sep_len)) = find_event_end(&self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..end + sep_len).collect();
            if let Some(data) = event_data(&raw[..end]) {
                events.push(data);
            }
        }
        events
    }

    /// Flush a trailing event that was never terminated by a blank line.
    pub fn finish(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.buffer);
        event_data(&raw)
    }
}

fn find_event_end(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| (p, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn event_data(event: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(event);
    let lines: Vec<&str> = text
        .lines()
        .filter_map(|l| l.strip_prefix("data:"))
        .map(|d| d.strip_prefix(' ').unwrap_or(d))
        .collect();
    if lines.is_empty() {
        return None;
    }
    let data = lines.join("\n");
    let data = data.trim();
    if data.is_empty() {
        return None;
    }
    Some(data.to_string())
}

/// Turn a streaming response body into a sequence of text fragments
/// ending in `UpstreamEvent::Done`.
///
/// Malformed frames are logged and skipped. Waiting longer than
/// `idle_timeout` for the next network chunk ends the stream with
/// `ChatError::UpstreamTimeout`.
pub fn fragments<B, T, E>(
    body: B,
    idle_timeout: Duration,
) -> impl Stream<Item = Result<UpstreamEvent, ChatError>> + Send
where
    B: Stream<Item = Result<T, E>> + Send,
    T: AsRef<[u8]> + Send,
    E: Display + Send,
{
    try_stream! {
        let mut body = Box::pin(body);
        let mut decoder = SseDecoder::new();

        'outer: loop {
            let next = tokio::time::timeout(idle_timeout, body.next())
                .await
                .map_err(|_| ChatError::UpstreamTimeout(idle_timeout))?;

            let (payloads, exhausted) = match next {
                Some(chunk) => {
                    let chunk = chunk.map_err(|e| ChatError::UpstreamUnavailable(e.to_string()))?;
                    (decoder.push(chunk.as_ref()), false)
                }
                // Body ended, possibly without the sentinel
                None => (decoder.finish().into_iter().collect::<Vec<_>>(), true),
            };

            for data in payloads {
                match parse_frame(&data) {
                    Ok(Some(UpstreamEvent::Done)) => break 'outer,
                    Ok(Some(event)) => yield event,
                    Ok(None) => {}
                    Err(e) => tracing::warn!("Skipping upstream frame: {}", e),
                }
            }

            if exhausted {
                tracing::warn!("Upstream body ended without a [DONE] sentinel");
                break 'outer;
            }
        }

        yield UpstreamEvent::Done;
    }
}

/// Streaming client for an OpenAI compatible chat completion API.
#[derive(Clone, Debug)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_hostname: String,
    api_key: String,
    model: String,
    temperature: f64,
    idle_timeout: Duration,
}

impl OpenAiClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_hostname: config.openai_api_hostname.clone(),
            api_key: config.openai_api_key.clone(),
            model: config.openai_model.clone(),
            temperature: config.temperature,
            idle_timeout: config.upstream_idle_timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Open a streaming completion for `messages`.
    ///
    /// Fails with `UpstreamUnavailable` (or `UpstreamTimeout`) before
    /// producing anything if the request can't be sent or the response
    /// status isn't a success.
    pub async fn completion_stream(
        &self,
        messages: &[ChatMessage],
    ) -> Result<FragmentStream, ChatError> {
        let payload = json!({
            "model": self.model,
            "stream": true,
            "temperature": self.temperature,
            "messages": messages,
        });
        let url = format!(
            "{}/v1/chat/completions",
            self.api_hostname.trim_end_matches("/")
        );
        let request = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send();

        let response = tokio::time::timeout(self.idle_timeout, request)
            .await
            .map_err(|_| ChatError::UpstreamTimeout(self.idle_timeout))?
            .map_err(|e| ChatError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // The error body is only for the log, don't wait forever on it
            let body = tokio::time::timeout(self.idle_timeout, response.text())
                .await
                .ok()
                .and_then(Result::ok)
                .unwrap_or_default();
            return Err(ChatError::UpstreamUnavailable(format!(
                "status {}: {}",
                status, body
            )));
        }

        Ok(Box::pin(fragments(response.bytes_stream(), self.idle_timeout)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::io::Write;

    fn test_config(hostname: &str) -> AppConfig {
        test_config_with_timeout(hostname, Duration::from_secs(5))
    }

    fn test_config_with_timeout(hostname: &str, idle_timeout: Duration) -> AppConfig {
        AppConfig {
            storage_path: String::from("./"),
            db_path: String::from("./db"),
            openai_model: String::from("gpt-4o-mini"),
            openai_api_hostname: hostname.to_string(),
            openai_api_key: String::from("test-key"),
            temperature: 0.9,
            upstream_idle_timeout: idle_timeout,
            jwt_secret: String::from("test-secret"),
        }
    }

    async fn collect_events(
        s: impl Stream<Item = Result<UpstreamEvent, ChatError>>,
    ) -> Vec<Result<UpstreamEvent, ChatError>> {
        s.collect::<Vec<_>>().await
    }

    fn texts(events: &[Result<UpstreamEvent, ChatError>]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                Ok(UpstreamEvent::Fragment { text, .. }) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_sse_decoder_handles_split_events() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert!(decoder.push(b":1}\n").is_empty());
        let events = decoder.push(b"\ndata: [DONE]\n\n");
        assert_eq!(events, vec![r#"{"a":1}"#.to_string(), "[DONE]".to_string()]);
    }

    #[test]
    fn test_sse_decoder_handles_split_multibyte_characters() {
        let frame = "data: {\"content\":\"caf\u{e9}\"}\n\n".as_bytes();
        // Split inside the two byte encoding of the accented character
        let split = frame.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&frame[..split]).is_empty());
        let events = decoder.push(&frame[split..]);
        assert_eq!(events, vec!["{\"content\":\"caf\u{e9}\"}".to_string()]);
    }

    #[test]
    fn test_sse_decoder_crlf_and_comments() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\r\n\r\ndata: one\r\n\r\nevent: x\n\n");
        assert_eq!(events, vec!["one".to_string()]);
        assert_eq!(decoder.push(b"data: tail"), Vec::<String>::new());
        assert_eq!(decoder.finish(), Some("tail".to_string()));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_parse_frame() {
        assert_eq!(parse_frame("[DONE]").unwrap(), Some(UpstreamEvent::Done));

        let role_only = r#"{"id":"c1","object":"chat.completion.chunk","created":1,"model":"m","choices":[{"index":0,"delta":{"role":"assistant","content":""},"finish_reason":null}]}"#;
        assert_eq!(parse_frame(role_only).unwrap(), None);

        let stop = r#"{"id":"c1","created":1,"model":"m","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_frame(stop).unwrap(), None);

        let content = r#"{"id":"c1","created":1,"model":"m","choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}"#;
        match parse_frame(content).unwrap() {
            Some(UpstreamEvent::Fragment { text, chunk }) => {
                assert_eq!(text, "Hi");
                assert_eq!(chunk.id, "c1");
                assert_eq!(chunk.object, "chat.completion.chunk");
            }
            other => panic!("Expected a fragment, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_frame_rejects_malformed() {
        assert!(matches!(
            parse_frame("{not json"),
            Err(ChatError::MalformedFragment(_))
        ));
        let non_text = r#"{"choices":[{"index":0,"delta":{"content":42}}]}"#;
        assert!(matches!(
            parse_frame(non_text),
            Err(ChatError::MalformedFragment(_))
        ));
    }

    #[test]
    fn test_synthetic_chunk_shape() {
        let chunk = CompletionChunk::synthetic("\n\nAlso, hi", "gpt-4o-mini");
        let json = serde_json::to_value(&chunk).unwrap();
        assert!(json["id"].as_str().unwrap().starts_with("addon-"));
        assert_eq!(json["object"], "chat.completion.chunk");
        assert!(json["created"].as_i64().unwrap() > 0);
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["choices"][0]["index"], 0);
        assert_eq!(json["choices"][0]["delta"]["content"], "\n\nAlso, hi");
        assert!(json["choices"][0]["finish_reason"].is_null());
    }

    #[tokio::test]
    async fn test_fragments_skips_malformed_frames() {
        let body = stream::iter(vec![
            Ok::<_, std::io::Error>(
                b"data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hi\"}}]}\n\n".to_vec(),
            ),
            Ok(b"data: {garbage\n\n".to_vec()),
            Ok(b"data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\" there\"}}]}\n\ndata: [DONE]\n\n".to_vec()),
            Ok(b"data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"ignored\"}}]}\n\n".to_vec()),
        ]);
        let events = collect_events(fragments(body, Duration::from_secs(1))).await;

        assert_eq!(texts(&events), vec!["Hi", " there"]);
        assert!(matches!(events.last(), Some(Ok(UpstreamEvent::Done))));
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn test_fragments_treats_end_of_body_as_done() {
        let body = stream::iter(vec![Ok::<_, std::io::Error>(
            b"data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hi\"}}]}".to_vec(),
        )]);
        let events = collect_events(fragments(body, Duration::from_secs(1))).await;

        assert_eq!(texts(&events), vec!["Hi"]);
        assert!(matches!(events.last(), Some(Ok(UpstreamEvent::Done))));
    }

    #[tokio::test]
    async fn test_fragments_surfaces_network_errors() {
        let body = stream::iter(vec![
            Ok(b"data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hi\"}}]}\n\n".to_vec()),
            Err(std::io::Error::other("connection reset")),
        ]);
        let events = collect_events(fragments(body, Duration::from_secs(1))).await;

        assert_eq!(texts(&events), vec!["Hi"]);
        assert!(matches!(
            events.last(),
            Some(Err(ChatError::UpstreamUnavailable(_)))
        ));
    }

    #[tokio::test]
    async fn test_fragments_idle_timeout() {
        let body = stream::pending::<Result<Vec<u8>, std::io::Error>>();
        let events = collect_events(fragments(body, Duration::from_millis(20))).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(ChatError::UpstreamTimeout(_))));
    }

    #[tokio::test]
    async fn test_completion_stream_content() {
        let mut server = mockito::Server::new_async().await;

        let sse_response = r#"data: {"id":"chunk0","object":"chat.completion.chunk","created":1234567890,"model":"gpt-4o-mini-2024-07-18","choices":[{"index":0,"delta":{"role":"assistant","content":""},"finish_reason":null}]}

data: {"id":"chunk1","object":"chat.completion.chunk","created":1234567890,"model":"gpt-4o-mini-2024-07-18","choices":[{"index":0,"delta":{"content":"Hello"},"finish_reason":null}]}

data: {"id":"chunk2","object":"chat.completion.chunk","created":1234567890,"model":"gpt-4o-mini-2024-07-18","choices":[{"index":0,"delta":{"content":" World"},"finish_reason":null}]}

data: {"id":"chunk3","object":"chat.completion.chunk","created":1234567890,"model":"gpt-4o-mini-2024-07-18","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}

data: [DONE]

"#;

        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(mockito::Matcher::PartialJson(json!({
                "model": "gpt-4o-mini",
                "stream": true,
                "temperature": 0.9,
                "messages": [{"role": "user", "content": "Say hello"}]
            })))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_response)
            .create_async()
            .await;

        let client = OpenAiClient::new(&test_config(&server.url()));
        let messages = vec![ChatMessage::new(Role::User, "Say hello")];
        let stream = client.completion_stream(&messages).await.unwrap();
        let events = collect_events(stream).await;

        mock.assert_async().await;
        assert_eq!(texts(&events), vec!["Hello", " World"]);
        assert!(matches!(events.last(), Some(Ok(UpstreamEvent::Done))));
    }

    #[tokio::test]
    async fn test_completion_stream_error_status() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .with_body(r#"{"error":"boom"}"#)
            .create_async()
            .await;

        let client = OpenAiClient::new(&test_config(&server.url()));
        let messages = vec![ChatMessage::new(Role::User, "Hi")];
        let result = client.completion_stream(&messages).await;

        mock.assert_async().await;
        assert!(matches!(result, Err(ChatError::UpstreamUnavailable(_))));
    }

    #[tokio::test]
    async fn test_completion_stream_error_status_with_stalled_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(503)
            .with_chunked_body(|w| {
                w.write_all(b"{\"error\":")?;
                std::thread::sleep(Duration::from_secs(3));
                w.write_all(b"\"late\"}")
            })
            .create_async()
            .await;

        let client = OpenAiClient::new(&test_config_with_timeout(
            &server.url(),
            Duration::from_millis(300),
        ));
        let messages = vec![ChatMessage::new(Role::User, "Hi")];
        let started = std::time::Instant::now();
        let result = client.completion_stream(&messages).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        match result {
            Err(ChatError::UpstreamUnavailable(msg)) => assert!(msg.contains("503")),
            other => panic!("Expected UpstreamUnavailable, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_completion_stream_connection_refused() {
        // Nothing listens on port 9 of localhost
        let client = OpenAiClient::new(&test_config("http://127.0.0.1:9"));
        let messages = vec![ChatMessage::new(Role::User, "Hi")];
        let result = client.completion_stream(&messages).await;
        assert!(matches!(result, Err(ChatError::UpstreamUnavailable(_))));
    }
}
