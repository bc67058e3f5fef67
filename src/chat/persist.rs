//! Records a finished exchange.

use chrono::{DateTime, Duration, Utc};

use super::db::ConversationStore;
use super::error::ChatError;
use super::models::Message;
use super::relay::RelayOutcome;

/// The current time truncated to the microsecond precision the store
/// keeps.
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}

/// A timestamp strictly after `after`, as close to now as possible.
pub fn timestamp_after(after: DateTime<Utc>) -> DateTime<Utc> {
    now().max(after + Duration::microseconds(1))
}

/// Append the assistant's reply for a completed relay.
///
/// The content is exactly what the model produced. The supplement is
/// only kept in the metadata so it's never replayed as context.
pub async fn finalize_turn(
    store: &dyn ConversationStore,
    user_id: &str,
    thread_id: &str,
    user_msg_created_at: DateTime<Utc>,
    outcome: &RelayOutcome,
) -> Result<Message, ChatError> {
    let msg = Message::assistant(
        &outcome.text,
        outcome.supplement.trim(),
        timestamp_after(user_msg_created_at),
    );
    store
        .append_message(user_id, thread_id, &msg)
        .await
        .map_err(|e| match e {
            ChatError::Persistence(_) => e,
            other => ChatError::Persistence(other.to_string()),
        })?;
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::db::SqliteStore;
    use crate::chat::models::Role;
    use crate::core::db::initialize_db;
    use tokio_rusqlite::Connection;

    async fn test_store() -> SqliteStore {
        let db = Connection::open_in_memory().await.unwrap();
        db.call(|conn| {
            initialize_db(conn).expect("Failed to initialize db");
            Ok(())
        })
        .await
        .unwrap();
        SqliteStore::new(db)
    }

    #[test]
    fn test_timestamp_after_is_strictly_later() {
        // Even when the clock is behind the user message
        let future = Utc::now() + Duration::hours(1);
        let ts = timestamp_after(future);
        assert!(ts > future);

        let past = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert!(timestamp_after(past) > past);
    }

    #[tokio::test]
    async fn test_finalize_keeps_supplement_out_of_content() {
        let store = test_store().await;
        let thread_id = store.create_thread("alice", "chat").await.unwrap();
        let user_msg = Message::user("hey", now());
        store
            .append_message("alice", &thread_id, &user_msg)
            .await
            .unwrap();

        let outcome = RelayOutcome {
            text: String::from("Hi there"),
            supplement: String::from("Also, LeBron has four rings."),
        };
        finalize_turn(&store, "alice", &thread_id, user_msg.created_at, &outcome)
            .await
            .unwrap();

        let messages = store.list_messages("alice", &thread_id, None).await.unwrap();
        assert_eq!(messages.len(), 2);
        let reply = &messages[1];
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, "Hi there");
        assert!(!reply.content.contains("LeBron"));
        assert_eq!(
            reply.meta.as_ref().unwrap().fact,
            "Also, LeBron has four rings."
        );
        assert_eq!(reply.include_in_context, Some(true));
        assert!(reply.created_at > messages[0].created_at);
    }

    #[tokio::test]
    async fn test_finalize_reports_failures() {
        let store = test_store().await;
        let outcome = RelayOutcome {
            text: String::from("Hi"),
            supplement: String::from("Also, a fact."),
        };
        let result = finalize_turn(&store, "alice", "missing", now(), &outcome).await;
        assert!(matches!(result, Err(ChatError::Persistence(_))));
    }
}
