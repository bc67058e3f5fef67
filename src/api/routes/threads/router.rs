//! Router for the threads API

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    routing::get,
};

use super::public;
use crate::api::AuthUser;
use crate::api::public::ApiError;
use crate::api::state::SharedState;
use crate::chat::ChatError;

/// Create a thread. The body is optional.
async fn create_thread(
    State(state): State<SharedState>,
    AuthUser(user_id): AuthUser,
    body: Bytes,
) -> Result<Json<public::CreateThreadResponse>, ApiError> {
    let payload: public::CreateThreadRequest = if body.is_empty() {
        public::CreateThreadRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ChatError::BadRequest(e.to_string()))?
    };
    let title = payload
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(public::DEFAULT_THREAD_TITLE);

    let thread_id = state.store.create_thread(&user_id, title).await?;
    tracing::debug!("Created thread {} for {}", thread_id, user_id);

    Ok(Json(public::CreateThreadResponse { thread_id }))
}

/// List the caller's threads, newest first
async fn list_threads(
    State(state): State<SharedState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<public::ThreadsResponse>, ApiError> {
    let threads = state
        .store
        .list_threads(&user_id, public::THREAD_LIST_LIMIT)
        .await?;
    Ok(Json(public::ThreadsResponse { threads }))
}

/// Full transcript of a thread, oldest first
async fn thread_messages(
    State(state): State<SharedState>,
    AuthUser(user_id): AuthUser,
    Path(thread_id): Path<String>,
) -> Result<Json<public::MessagesResponse>, ApiError> {
    if state.store.find_thread(&user_id, &thread_id).await?.is_none() {
        return Err(ChatError::NotFound(thread_id).into());
    }
    let messages = state.store.list_messages(&user_id, &thread_id, None).await?;
    Ok(Json(public::MessagesResponse { messages }))
}

/// Create the threads router
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_threads).post(create_thread))
        .route("/{thread_id}/messages", get(thread_messages))
}
