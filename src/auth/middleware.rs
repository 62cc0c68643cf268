use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::auth::AuthToken;
use crate::error::AppError;

/// Axum middleware that reads the caller's token from the Authorization
/// header and injects an `AuthToken` into request extensions.
///
/// Requests without a usable token are rejected here, before any handler or
/// ledger lookup runs.
pub async fn require_token(mut request: Request, next: Next) -> Result<Response, AppError> {
    let token = extract_token(&request)?;
    request.extensions_mut().insert(AuthToken(token));
    Ok(next.run(request).await)
}

/// Extract the token from the Authorization header.
///
/// The header carries the raw token; a leading `Bearer ` is accepted and
/// stripped.
fn extract_token(request: &Request) -> Result<String, AppError> {
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    let value = header
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid Authorization header encoding".to_string()))?;

    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();

    if token.is_empty() {
        return Err(AppError::Unauthorized("Empty authorization token".to_string()));
    }

    Ok(token.to_string())
}
