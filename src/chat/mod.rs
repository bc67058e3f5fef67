//! The message relay: takes a user's message, streams the model's
//! reply back and records the exchange.

pub mod context;
pub mod db;
mod error;
pub mod facts;
pub mod models;
pub mod persist;
pub mod relay;

pub use context::{CONTEXT_WINDOW, assemble_context};
pub use db::{ConversationStore, SharedStore, SqliteStore};
pub use error::ChatError;
pub use facts::FactPool;
pub use models::{Message, MessageMeta, Role, Thread, UserId};
pub use persist::finalize_turn;
pub use relay::{Frame, RELAY_BUFFER, RelayOutcome, relay};

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc;

use crate::openai::{ChatMessage, OpenAiClient};

/// Runs chat turns. One instance is shared by all requests; each turn
/// gets its own task and channel.
#[derive(Clone)]
pub struct ChatService {
    store: SharedStore,
    upstream: OpenAiClient,
    facts: FactPool,
}

impl ChatService {
    pub fn new(store: SharedStore, upstream: OpenAiClient) -> Self {
        Self {
            store,
            upstream,
            facts: FactPool::default(),
        }
    }

    pub fn with_facts(mut self, facts: FactPool) -> Self {
        self.facts = facts;
        self
    }

    /// Validate and record the user's message, then start relaying the
    /// reply. Returns the receiving end of the caller's stream.
    ///
    /// Everything that can be rejected is rejected before the store is
    /// touched. The user message is stored before the upstream request
    /// is made.
    pub async fn start_turn(
        &self,
        user_id: &str,
        thread_id: &str,
        content: &str,
    ) -> Result<mpsc::Receiver<Frame>, ChatError> {
        if thread_id.is_empty() {
            return Err(ChatError::BadRequest(String::from("threadId is required")));
        }
        if content.is_empty() {
            return Err(ChatError::BadRequest(String::from("content is required")));
        }
        if self.store.find_thread(user_id, thread_id).await?.is_none() {
            return Err(ChatError::NotFound(thread_id.to_string()));
        }

        let user_msg = Message::user(content, persist::now());
        self.store
            .append_message(user_id, thread_id, &user_msg)
            .await?;

        let history = self
            .store
            .list_context_messages(user_id, thread_id, CONTEXT_WINDOW)
            .await?;
        let context = assemble_context(&history);

        let (tx, rx) = mpsc::channel(RELAY_BUFFER);
        let service = self.clone();
        let user_id = user_id.to_string();
        let thread_id = thread_id.to_string();
        tokio::spawn(async move {
            service
                .run_turn(tx, &user_id, &thread_id, user_msg.created_at, context)
                .await
        });

        Ok(rx)
    }

    async fn run_turn(
        &self,
        tx: mpsc::Sender<Frame>,
        user_id: &str,
        thread_id: &str,
        user_msg_created_at: DateTime<Utc>,
        context: Vec<ChatMessage>,
    ) {
        let upstream = match self.upstream.completion_stream(&context).await {
            Ok(upstream) => upstream,
            Err(e) => {
                tracing::error!("Upstream request for thread {} failed: {}", thread_id, e);
                let _ = tx.send(Frame::Error(e.to_string())).await;
                return;
            }
        };

        let mut rng = StdRng::from_rng(&mut rand::rng());
        let outcome = relay(
            upstream,
            &tx,
            &self.facts,
            &mut rng,
            self.upstream.model(),
        )
        .await;

        match outcome {
            Ok(outcome) => {
                // The caller's stream stays open until this returns so
                // the next turn always sees this one in its history.
                if let Err(e) = finalize_turn(
                    self.store.as_ref(),
                    user_id,
                    thread_id,
                    user_msg_created_at,
                    &outcome,
                )
                .await
                {
                    tracing::error!(
                        "Failed to save reply for thread {}, it will be missing from context: {}",
                        thread_id,
                        e
                    );
                }
            }
            Err(ChatError::Disconnected) => {
                tracing::info!("Caller left thread {} mid-stream, reply discarded", thread_id);
            }
            Err(e) => {
                tracing::error!("Relay for thread {} failed: {}", thread_id, e);
            }
        }
    }
}
