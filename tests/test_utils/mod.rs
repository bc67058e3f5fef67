//! Test utilities for integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{Router, body::Body};
use serde_json::json;
use tempfile::TempDir;

use aurabot::api::{AppState, SharedState, app};
use aurabot::auth::JwtVerifier;
use aurabot::chat::FactPool;
use aurabot::core::AppConfig;
use aurabot::core::db::{async_db, initialize_db};

pub const TEST_SECRET: &str = "test-jwt-secret";
pub const TEST_USER: &str = "test-user";

pub struct TestApp {
    pub app: Router,
    pub state: SharedState,
    pub token: String,
    // Keeps the database directory alive for the duration of the test
    _dir: TempDir,
}

/// Creates a test application router backed by a fresh SQLite
/// database in a temporary directory, talking to `upstream_url` for
/// completions.
pub async fn test_app(upstream_url: &str) -> TestApp {
    test_app_with(upstream_url, Duration::from_secs(5), None).await
}

/// Like `test_app` with a custom upstream idle timeout and, optionally,
/// a fixed fact pool.
pub async fn test_app_with(
    upstream_url: &str,
    idle_timeout: Duration,
    facts: Option<FactPool>,
) -> TestApp {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("db");
    let db_path_str = db_path.to_str().unwrap();

    let db = async_db(db_path_str)
        .await
        .expect("Failed to connect to async db");
    db.call(|conn| {
        initialize_db(conn).expect("Failed to migrate db");
        Ok(())
    })
    .await
    .unwrap();

    let app_config = AppConfig {
        storage_path: dir.path().display().to_string(),
        db_path: db_path_str.to_string(),
        openai_model: String::from("gpt-4o-mini"),
        openai_api_hostname: upstream_url.to_string(),
        openai_api_key: String::from("test-api-key"),
        temperature: 0.9,
        upstream_idle_timeout: idle_timeout,
        jwt_secret: String::from(TEST_SECRET),
    };
    let mut state = AppState::new(db, app_config);
    if let Some(facts) = facts {
        state.chat = state.chat.clone().with_facts(facts);
    }
    let state = Arc::new(state);

    TestApp {
        app: app(Arc::clone(&state)),
        state,
        token: token_for(TEST_USER),
        _dir: dir,
    }
}

pub fn token_for(user_id: &str) -> String {
    JwtVerifier::new(TEST_SECRET).issue(user_id, 60 * 60).unwrap()
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// The `data` payload of each event in a server-sent-events body.
pub fn sse_data(body: &str) -> Vec<String> {
    body.split("\n\n")
        .filter_map(|event| {
            let data: Vec<&str> = event
                .lines()
                .filter_map(|l| l.strip_prefix("data: "))
                .collect();
            if data.is_empty() {
                None
            } else {
                Some(data.join("\n"))
            }
        })
        .collect()
}

/// The delta text of a chunk payload.
pub fn delta_content(data: &str) -> String {
    let v: serde_json::Value = serde_json::from_str(data).unwrap();
    v["choices"][0]["delta"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

/// An upstream streaming response body emitting `deltas` in order.
pub fn upstream_body(deltas: &[&str]) -> String {
    let mut body = String::new();
    let frame = |delta: serde_json::Value, finish: serde_json::Value| {
        json!({
            "id": "chatcmpl-test",
            "object": "chat.completion.chunk",
            "created": 1_700_000_000,
            "model": "gpt-4o-mini-2024-07-18",
            "system_fingerprint": "fp_test",
            "choices": [{"index": 0, "delta": delta, "finish_reason": finish}]
        })
    };
    body.push_str(&format!(
        "data: {}\n\n",
        frame(json!({"role": "assistant", "content": ""}), json!(null))
    ));
    for d in deltas {
        body.push_str(&format!(
            "data: {}\n\n",
            frame(json!({"content": d}), json!(null))
        ));
    }
    body.push_str(&format!("data: {}\n\n", frame(json!({}), json!("stop"))));
    body.push_str("data: [DONE]\n\n");
    body
}
