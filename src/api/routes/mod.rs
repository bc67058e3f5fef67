//! API routes module

pub mod chat;
pub mod threads;

use axum::Router;

use crate::api::state::SharedState;

/// Create the combined API router
pub fn router() -> Router<SharedState> {
    Router::new()
        // Streaming chat turns
        .nest("/chat", chat::router())
        // Thread listing, creation and transcripts
        .nest("/threads", threads::router())
}
