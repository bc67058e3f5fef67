//! Public types for the threads API
use serde::{Deserialize, Serialize};

use crate::chat::{Message, Thread};

pub const DEFAULT_THREAD_TITLE: &str = "New Chat";

/// Most threads returned by a listing.
pub const THREAD_LIST_LIMIT: usize = 50;

#[derive(Deserialize, Default, Debug)]
pub struct CreateThreadRequest {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateThreadResponse {
    pub thread_id: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ThreadsResponse {
    pub threads: Vec<Thread>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
}
