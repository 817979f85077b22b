use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use lms_mailer::{DeliveryOrchestrator, TemplateEngine};

use crate::error::ApiError;
use crate::types::{AuthConfig, Claims};

#[derive(Clone)]
pub struct EmailState {
    pub orchestrator: Arc<DeliveryOrchestrator>,
    pub engine: Arc<dyn TemplateEngine>,
    pub auth: Arc<AuthConfig>,
}

/// Credential part of `Authorization: <scheme> <token>`. Any scheme is accepted.
fn extract_header_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get("Authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.split_once(' '))
        .map(|(_, token)| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

pub(crate) fn verify_token(token: &str, auth: &AuthConfig) -> Result<Claims, ApiError> {
    let key = DecodingKey::from_secret(auth.jwt_secret.as_bytes());
    decode::<Claims>(token, &key, &Validation::new(Algorithm::HS256))
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(error = %e, "Rejected access token");
            ApiError::InvalidToken
        })
}

/// Rejects requests without a valid access token and stores the caller's [`Claims`] in the
/// request extensions for the handlers.
pub async fn require_auth(
    State(state): State<EmailState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // Cookie first, then the Authorization header
    let token = jar
        .get(&state.auth.cookie_name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| extract_header_token(&request))
        .ok_or(ApiError::Unauthorized)?;

    let claims = verify_token(&token, &state.auth)?;
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}
