//! Identity verification for bearer tokens.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::chat::{ChatError, UserId};

/// Turns a bearer credential into a stable user id.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<UserId, ChatError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

/// Verifies HS256 signed JWTs, using the `sub` claim as the user id.
#[derive(Clone)]
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Mint a token for `user_id` valid for `ttl_secs`.
    pub fn issue(&self, user_id: &str, ttl_secs: i64) -> anyhow::Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: now + ttl_secs,
            iat: Some(now),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }
}

#[async_trait]
impl IdentityVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<UserId, ChatError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        // Tokens carry no issuer or audience
        validation.required_spec_claims.clear();
        validation.required_spec_claims.insert("exp".to_string());

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            tracing::warn!("Token validation failed: {:?}", e.kind());
            ChatError::Unauthorized
        })?;

        if data.claims.sub.trim().is_empty() {
            return Err(ChatError::Unauthorized);
        }
        Ok(data.claims.sub)
    }
}

/// Extract the token from an `Authorization: Bearer <token>` value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let mut parts = header_value.split_whitespace();
    let scheme = parts.next()?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some(token)
}
