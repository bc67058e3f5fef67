use std::sync::Arc;

use tokio_rusqlite::Connection;

use crate::auth::{IdentityVerifier, JwtVerifier};
use crate::chat::{ChatService, SharedStore, SqliteStore};
use crate::core::AppConfig;
use crate::openai::OpenAiClient;

pub type SharedState = Arc<AppState>;

/// Nothing in here is mutated after startup so it's shared without a
/// lock.
pub struct AppState {
    pub store: SharedStore,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub chat: ChatService,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(db: Connection, config: AppConfig) -> Self {
        let store: SharedStore = Arc::new(SqliteStore::new(db));
        let verifier = Arc::new(JwtVerifier::new(&config.jwt_secret));
        let chat = ChatService::new(Arc::clone(&store), OpenAiClient::new(&config));
        Self {
            store,
            verifier,
            chat,
            config,
        }
    }
}
