//! Threads and the messages logged under them.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = String;

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "user")]
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Assistant => "assistant",
            Role::User => "user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Role::System),
            "assistant" => Some(Role::Assistant),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Text shown to the user alongside a reply but never replayed to
/// the model.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct MessageMeta {
    pub fact: String,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<MessageMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_in_context: Option<bool>,
}

impl Message {
    pub fn user(content: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            role: Role::User,
            content: content.to_string(),
            created_at,
            meta: None,
            include_in_context: None,
        }
    }

    pub fn assistant(content: &str, fact: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_string(),
            created_at,
            meta: Some(MessageMeta {
                fact: fact.to_string(),
            }),
            include_in_context: Some(true),
        }
    }

    /// Messages are replayed unless explicitly opted out.
    pub fn in_context(&self) -> bool {
        self.include_in_context.unwrap_or(true)
    }
}
