use axum::body::Bytes;
use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::AuthToken;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct AddTokensRequest {
    pub amount: i64,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub token_balance: i64,
}

/// POST /addtokens
///
/// Body: `{"amount": <int>}`. The body is parsed by hand so that every
/// malformed payload maps to the same 400 error shape.
pub async fn add_tokens(
    State(state): State<AppState>,
    Extension(token): Extension<AuthToken>,
    body: Bytes,
) -> Result<Json<BalanceResponse>, AppError> {
    let req: AddTokensRequest = serde_json::from_slice(&body)?;
    let token_balance = state.meter.credit(token.as_str(), req.amount)?;
    Ok(Json(BalanceResponse { token_balance }))
}

/// GET /balance
pub async fn get_balance(
    State(state): State<AppState>,
    Extension(token): Extension<AuthToken>,
) -> Result<Json<BalanceResponse>, AppError> {
    let token_balance = state.meter.balance(token.as_str())?;
    Ok(Json(BalanceResponse { token_balance }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{get, json_body, post_json, state_with};
    use crate::ledger::{CreditStore, MemoryCreditStore};
    use axum::Router;
    use axum::http::StatusCode;
    use axum::middleware;
    use axum::routing;
    use tower::ServiceExt;

    fn app(store: MemoryCreditStore) -> Router {
        Router::new()
            .route("/addtokens", routing::post(add_tokens))
            .route("/balance", routing::get(get_balance))
            .layer(middleware::from_fn(crate::auth::middleware::require_token))
            .with_state(state_with(store))
    }

    #[tokio::test]
    async fn test_add_tokens_returns_new_balance() {
        let store = MemoryCreditStore::with_client("tok", 0);
        let resp = app(store.clone())
            .oneshot(post_json("/addtokens", Some("tok"), r#"{"amount":5}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["token_balance"], 5);
        assert_eq!(store.balance("tok").unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_add_tokens_malformed_body() {
        let store = MemoryCreditStore::with_client("tok", 1);
        let app = app(store.clone());

        for body in ["", "{", r#"{"amount":"five"}"#, r#"{"qty":5}"#, r#"{"amount":1.5}"#] {
            let resp = app
                .clone()
                .oneshot(post_json("/addtokens", Some("tok"), body))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body {body:?}");
            assert_eq!(json_body(resp).await["error"]["type"], "invalid_request_error");
        }
        assert_eq!(store.balance("tok").unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_add_tokens_unknown_token() {
        let store = MemoryCreditStore::new();
        let resp = app(store.clone())
            .oneshot(post_json("/addtokens", Some("ghost"), r#"{"amount":5}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_get_balance() {
        let store = MemoryCreditStore::with_client("tok", 7);
        let resp = app(store).oneshot(get("/balance", Some("tok"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await, serde_json::json!({ "token_balance": 7 }));
    }

    #[tokio::test]
    async fn test_get_balance_unknown_token() {
        let resp = app(MemoryCreditStore::new())
            .oneshot(get("/balance", Some("ghost")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
