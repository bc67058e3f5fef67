//! SQLite connection and schema management.

use anyhow::Result;
use rusqlite::Connection as SyncConnection;
use tokio_rusqlite::Connection;

/// Open (or create) the database file at `path`.
pub async fn async_db(path: &str) -> Result<Connection> {
    let db = Connection::open(path).await?;
    db.call(|conn| {
        // Readers shouldn't block the writer appending a finished turn
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    })
    .await?;
    Ok(db)
}

/// Create all tables and indices. Safe to run repeatedly.
pub fn initialize_db(conn: &SyncConnection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS thread (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS thread_user_created
            ON thread (user_id, created_at DESC);

        CREATE TABLE IF NOT EXISTS message (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            thread_id TEXT NOT NULL REFERENCES thread(id),
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            meta TEXT,
            include_in_context INTEGER,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS message_thread_created
            ON message (user_id, thread_id, created_at, id);
        "#,
    )
}
