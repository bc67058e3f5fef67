//! Conversation store backed by SQLite.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use tokio_rusqlite::{Connection, params};
use uuid::Uuid;

use super::error::ChatError;
use super::models::{Message, MessageMeta, Role, Thread};

/// Per-user, per-thread append-only message log.
///
/// Every operation is scoped to `user_id`; another user's thread is
/// indistinguishable from one that doesn't exist.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_thread(&self, user_id: &str, title: &str) -> Result<String, ChatError>;

    async fn find_thread(
        &self,
        user_id: &str,
        thread_id: &str,
    ) -> Result<Option<Thread>, ChatError>;

    /// Newest first.
    async fn list_threads(&self, user_id: &str, limit: usize) -> Result<Vec<Thread>, ChatError>;

    async fn append_message(
        &self,
        user_id: &str,
        thread_id: &str,
        msg: &Message,
    ) -> Result<(), ChatError>;

    /// Oldest first. With a `limit`, only the most recent `limit`
    /// messages are returned (still oldest first).
    async fn list_messages(
        &self,
        user_id: &str,
        thread_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, ChatError>;

    /// The most recent `limit` messages that may be replayed to the
    /// model, oldest first. Messages excluded from context don't count
    /// towards the limit.
    async fn list_context_messages(
        &self,
        user_id: &str,
        thread_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, ChatError>;
}

pub type SharedStore = Arc<dyn ConversationStore>;

#[derive(Clone)]
pub struct SqliteStore {
    db: Connection,
}

impl SqliteStore {
    pub fn new(db: Connection) -> Self {
        Self { db }
    }
}

fn timestamp_from_micros(idx: usize, micros: i64) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp out of range: {}", micros).into(),
        )
    })
}

fn thread_from_row(row: &rusqlite::Row) -> Result<Thread, rusqlite::Error> {
    Ok(Thread {
        id: row.get(0)?,
        title: row.get(1)?,
        created_at: timestamp_from_micros(2, row.get(2)?)?,
    })
}

fn message_from_row(row: &rusqlite::Row) -> Result<Message, rusqlite::Error> {
    let role: String = row.get(0)?;
    let role = Role::parse(&role).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            Type::Text,
            format!("unknown role: {}", role).into(),
        )
    })?;
    let meta: Option<String> = row.get(2)?;
    let meta = meta
        .map(|m| serde_json::from_str::<MessageMeta>(&m))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(Message {
        role,
        content: row.get(1)?,
        meta,
        include_in_context: row.get(3)?,
        created_at: timestamp_from_micros(4, row.get(4)?)?,
    })
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn create_thread(&self, user_id: &str, title: &str) -> Result<String, ChatError> {
        let thread_id = Uuid::new_v4().to_string();
        let id = thread_id.clone();
        let user_id = user_id.to_owned();
        let title = title.to_owned();
        let created_at = Utc::now().timestamp_micros();

        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO thread (id, user_id, title, created_at) VALUES (?1, ?2, ?3, ?4)",
                    params![id, user_id, title, created_at],
                )?;
                Ok(())
            })
            .await?;

        Ok(thread_id)
    }

    async fn find_thread(
        &self,
        user_id: &str,
        thread_id: &str,
    ) -> Result<Option<Thread>, ChatError> {
        let user_id = user_id.to_owned();
        let thread_id = thread_id.to_owned();
        let thread = self
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, title, created_at FROM thread WHERE id = ?1 AND user_id = ?2",
                )?;
                let mut rows = stmt.query_map(params![thread_id, user_id], thread_from_row)?;
                Ok(rows.next().transpose()?)
            })
            .await?;
        Ok(thread)
    }

    async fn list_threads(&self, user_id: &str, limit: usize) -> Result<Vec<Thread>, ChatError> {
        let user_id = user_id.to_owned();
        let limit = limit as i64;
        let threads = self
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id, title, created_at
                    FROM thread
                    WHERE user_id = ?1
                    ORDER BY created_at DESC, rowid DESC
                    LIMIT ?2
                    "#,
                )?;
                let threads = stmt
                    .query_map(params![user_id, limit], thread_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(threads)
            })
            .await?;
        Ok(threads)
    }

    async fn append_message(
        &self,
        user_id: &str,
        thread_id: &str,
        msg: &Message,
    ) -> Result<(), ChatError> {
        let user_id = user_id.to_owned();
        let thread_id = thread_id.to_owned();
        let role = msg.role.as_str();
        let content = msg.content.clone();
        let meta = msg
            .meta
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| ChatError::Persistence(e.to_string()))?;
        let include_in_context = msg.include_in_context;
        let created_at = msg.created_at.timestamp_micros();
        let missing_thread = thread_id.clone();

        let inserted = self
            .db
            .call(move |conn| {
                // Only insert into a thread the user owns
                let inserted = conn.execute(
                    r#"
                    INSERT INTO message
                        (user_id, thread_id, role, content, meta, include_in_context, created_at)
                    SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7
                    WHERE EXISTS (SELECT 1 FROM thread WHERE id = ?2 AND user_id = ?1)
                    "#,
                    params![
                        user_id,
                        thread_id,
                        role,
                        content,
                        meta,
                        include_in_context,
                        created_at
                    ],
                )?;
                Ok(inserted)
            })
            .await?;

        if inserted == 0 {
            return Err(ChatError::NotFound(missing_thread));
        }
        Ok(())
    }

    async fn list_messages(
        &self,
        user_id: &str,
        thread_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, ChatError> {
        // A negative limit means no limit in SQLite
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        self.query_messages(user_id, thread_id, limit, false).await
    }

    async fn list_context_messages(
        &self,
        user_id: &str,
        thread_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, ChatError> {
        self.query_messages(user_id, thread_id, limit as i64, true)
            .await
    }
}

impl SqliteStore {
    async fn query_messages(
        &self,
        user_id: &str,
        thread_id: &str,
        limit: i64,
        replayable_only: bool,
    ) -> Result<Vec<Message>, ChatError> {
        let user_id = user_id.to_owned();
        let thread_id = thread_id.to_owned();
        let messages = self
            .db
            .call(move |conn| {
                // NULL counts as included
                let mut stmt = conn.prepare(
                    r#"
                    SELECT role, content, meta, include_in_context, created_at
                    FROM (
                        SELECT id, role, content, meta, include_in_context, created_at
                        FROM message
                        WHERE user_id = ?1 AND thread_id = ?2
                          AND (?4 = 0 OR include_in_context IS NOT 0)
                        ORDER BY created_at DESC, id DESC
                        LIMIT ?3
                    )
                    ORDER BY created_at ASC, id ASC
                    "#,
                )?;
                let messages = stmt
                    .query_map(
                        params![user_id, thread_id, limit, replayable_only],
                        message_from_row,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(messages)
            })
            .await?;
        Ok(messages)
    }
}
