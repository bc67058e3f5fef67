use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub storage_path: String,
    pub db_path: String,
    pub openai_model: String,
    pub openai_api_hostname: String,
    pub openai_api_key: String,
    pub temperature: f64,
    pub upstream_idle_timeout: Duration,
    pub jwt_secret: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let storage_path = env::var("AURABOT_STORAGE_PATH").unwrap_or("./".to_string());
        let db_path = format!("{}/db", storage_path.trim_end_matches('/'));
        let openai_api_hostname = env::var("AURABOT_LLM_HOST")
            .unwrap_or_else(|_| "https://api.openai.com".to_string());
        let openai_api_key =
            env::var("OPENAI_API_KEY").unwrap_or_else(|_| "thiswontworkforopenai".to_string());
        let openai_model =
            env::var("AURABOT_LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        // High temperature keeps the banter varied
        let temperature = env::var("AURABOT_LLM_TEMPERATURE")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.9);
        let upstream_idle_timeout = env::var("AURABOT_UPSTREAM_IDLE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));
        let jwt_secret = env::var("AURABOT_JWT_SECRET").unwrap_or_else(|_| {
            tracing::warn!("AURABOT_JWT_SECRET is not set, using an insecure development secret");
            "aurabot-dev-secret".to_string()
        });

        Self {
            storage_path,
            db_path,
            openai_api_hostname,
            openai_api_key,
            openai_model,
            temperature,
            upstream_idle_timeout,
            jwt_secret,
        }
    }
}
