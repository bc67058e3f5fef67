//! Public types for the chat API
use serde::Deserialize;

/// Both fields are optional here so that a missing field is reported
/// as a bad request rather than a deserialization failure.
#[derive(Deserialize, Default, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}
