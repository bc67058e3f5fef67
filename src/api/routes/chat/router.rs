//! Router for the chat API

use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    response::{IntoResponse, sse::Event, sse::KeepAlive, sse::Sse},
    routing::post,
};
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::ReceiverStream;

use super::public;
use crate::api::AuthUser;
use crate::api::public::ApiError;
use crate::api::state::SharedState;
use crate::chat::{ChatError, Frame};

fn to_event(frame: Frame) -> Event {
    let event = Event::default().data(frame.data());
    match frame.event() {
        Some(name) => event.event(name),
        None => event,
    }
}

/// Add a user message to a thread and stream the reply.
///
/// The response body ends once the reply has been saved. Dropping the
/// connection early abandons the turn.
async fn chat_handler(
    State(state): State<SharedState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<public::ChatRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload.map_err(|e| ChatError::BadRequest(e.body_text()))?;
    let thread_id = payload.thread_id.unwrap_or_default();
    let content = payload.content.unwrap_or_default();

    let rx = state.chat.start_turn(&user_id, &thread_id, &content).await?;

    let sse_stream =
        ReceiverStream::new(rx).map(|frame| Ok::<Event, Infallible>(to_event(frame)));

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::default()))
}

/// Create the chat router
pub fn router() -> Router<SharedState> {
    Router::new().route("/", post(chat_handler))
}
