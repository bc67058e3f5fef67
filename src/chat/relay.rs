//! Re-frames upstream fragments for the caller and appends the
//! supplemental fact once the model is finished.

use futures_util::{Stream, StreamExt};
use rand::Rng;
use serde_json::json;
use tokio::sync::mpsc;

use super::error::ChatError;
use super::facts::FactPool;
use crate::openai::{CompletionChunk, UpstreamEvent};

/// Frames buffered between the relay and the caller's connection
/// before the relay stops reading upstream.
pub const RELAY_BUFFER: usize = 32;

/// One event of the caller facing stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A serialized `chat.completion.chunk`.
    Chunk(String),
    /// The `[DONE]` sentinel.
    Done,
    /// The turn failed; no `[DONE]` follows.
    Error(String),
}

impl Frame {
    /// SSE event name, `None` for plain `data:` events.
    pub fn event(&self) -> Option<&'static str> {
        match self {
            Frame::Error(_) => Some("error"),
            _ => None,
        }
    }

    /// The payload of the `data:` field.
    pub fn data(&self) -> String {
        match self {
            Frame::Chunk(data) => data.clone(),
            Frame::Done => String::from("[DONE]"),
            Frame::Error(msg) => json!({ "error": msg }).to_string(),
        }
    }
}

/// What a completed relay hands to the persistence step.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayOutcome {
    /// Everything the model said, without the supplement.
    pub text: String,
    /// The supplemental fact as stored in metadata.
    pub supplement: String,
}

async fn send(tx: &mpsc::Sender<Frame>, frame: Frame) -> Result<(), ChatError> {
    tx.send(frame).await.map_err(|_| ChatError::Disconnected)
}

/// Drain `upstream` into `tx`.
///
/// Each fragment is forwarded as soon as it arrives. After the
/// upstream sentinel exactly one synthetic chunk carrying a fact from
/// `facts` is sent, followed by `[DONE]`. Sending waits for room in
/// the channel so a slow caller slows the upstream read.
///
/// Upstream errors are forwarded as `Frame::Error` and returned
/// without a supplement. If the receiver goes away the relay stops
/// reading and returns `ChatError::Disconnected`.
pub async fn relay<S, R>(
    upstream: S,
    tx: &mpsc::Sender<Frame>,
    facts: &FactPool,
    rng: &mut R,
    fallback_model: &str,
) -> Result<RelayOutcome, ChatError>
where
    S: Stream<Item = Result<UpstreamEvent, ChatError>>,
    R: Rng + ?Sized,
{
    let mut upstream = std::pin::pin!(upstream);
    let mut text = String::new();
    let mut model = fallback_model.to_string();

    loop {
        let event = tokio::select! {
            _ = tx.closed() => return Err(ChatError::Disconnected),
            event = upstream.next() => event,
        };

        match event {
            Some(Ok(UpstreamEvent::Fragment { text: piece, chunk })) => {
                if !chunk.model.is_empty() {
                    model = chunk.model.clone();
                }
                let data = match serde_json::to_string(&chunk) {
                    Ok(data) => data,
                    Err(e) => {
                        tracing::warn!("Skipping fragment that failed to encode: {}", e);
                        continue;
                    }
                };
                text.push_str(&piece);
                send(tx, Frame::Chunk(data)).await?;
            }
            Some(Ok(UpstreamEvent::Done)) | None => break,
            Some(Err(e)) => {
                // Best effort, the caller may already be gone
                let _ = tx.send(Frame::Error(e.to_string())).await;
                return Err(e);
            }
        }
    }

    let supplement = facts.supplement(rng);
    let chunk = CompletionChunk::synthetic(&format!("\n\n{}", supplement), &model);
    let data = serde_json::to_string(&chunk)
        .map_err(|e| ChatError::MalformedFragment(e.to_string()))?;
    send(tx, Frame::Chunk(data)).await?;
    send(tx, Frame::Done).await?;

    Ok(RelayOutcome { text, supplement })
}
