use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// External identity of the caller.
    pub sub: String,
    pub exp: usize,
}

/// Authenticated caller, available to handlers as `Extension<Identity>`.
#[derive(Debug, Clone)]
pub struct Identity(pub String);

pub async fn require_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::AuthenticationError("Missing bearer token".to_string()))?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        AppError::AuthenticationError("Invalid token".to_string())
    })?;

    if token_data.claims.sub.trim().is_empty() {
        return Err(AppError::AuthenticationError("Invalid token".to_string()));
    }

    req.extensions_mut().insert(Identity(token_data.claims.sub.clone()));
    req.extensions_mut().insert(token_data.claims);

    Ok(next.run(req).await)
}
