use axum::extract::FromRequestParts;
use http::header::AUTHORIZATION;
use http::request::Parts;

use super::public::ApiError;
use super::state::SharedState;
use crate::auth::bearer_token;
use crate::chat::{ChatError, UserId};

/// The verified caller. Rejects the request with 401 before the
/// handler runs if the bearer token is missing or invalid.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserId);

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .ok_or(ChatError::Unauthorized)?;

        let user_id = state.verifier.verify(token).await?;
        Ok(AuthUser(user_id))
    }
}
