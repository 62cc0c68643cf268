pub mod credits;
pub mod health;
pub mod memes;

use axum::Router;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::auth::middleware::require_token;
use crate::config::Config;

/// Build the full API router.
///
/// Route layout:
/// ```text
/// /health      GET   (no auth)
/// /memes       GET   (token required, costs one credit)
/// /addtokens   POST  (token required)
/// /balance     GET   (token required)
/// ```
pub fn build_api_router() -> Router<AppState> {
    let metered = Router::new()
        .route("/memes", get(memes::get_meme))
        .route("/addtokens", post(credits::add_tokens))
        .route("/balance", get(credits::get_balance))
        .layer(middleware::from_fn(require_token));

    Router::new()
        .route("/health", get(health::health_check))
        .merge(metered)
}

/// Build the complete application: API routes plus the global middleware
/// stack, bound to `state`.
pub fn build_app(state: AppState) -> Router {
    let config = &state.config;

    // -- CORS layer -----------------------------------------------------------
    let cors = build_cors_layer(config);

    // -- Request ID layer (X-Request-ID) --------------------------------------
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // -- Tracing layer --------------------------------------------------------
    let trace = TraceLayer::new_for_http();

    // -- Request timeout ------------------------------------------------------
    let timeout = TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        config.server.request_timeout(),
    );

    build_api_router()
        // Global middleware stack (applied to all routes)
        .layer(timeout)
        .layer(propagate_id)
        .layer(request_id)
        .layer(trace)
        .layer(cors)
        .with_state(state)
}

/// Build the CORS layer from config.
fn build_cors_layer(config: &Config) -> CorsLayer {
    if config.server.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .server
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, header};
    use axum::response::Response;

    use crate::AppState;
    use crate::config::Config;
    use crate::generator::MemeGenerator;
    use crate::ledger::{CallRecord, MemoryCreditStore};
    use crate::metering::Meter;

    /// State backed by an in-memory ledger. Call records are drained and
    /// discarded.
    pub fn state_with(store: MemoryCreditStore) -> AppState {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<CallRecord>();
        // Must be called from inside a tokio runtime. Ends with the meter.
        tokio::spawn(async move { while rx.recv().await.is_some() {} });
        AppState {
            config: Arc::new(Config::default()),
            meter: Arc::new(Meter::new(Arc::new(store), tx)),
            generator: Arc::new(MemeGenerator::from_seed(1)),
        }
    }

    pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(t) = token {
            builder = builder.header(header::AUTHORIZATION, t);
        }
        builder.body(Body::empty()).unwrap()
    }

    pub fn post_json(uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(t) = token {
            builder = builder.header(header::AUTHORIZATION, t);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    pub async fn json_body(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{get, post_json, state_with};
    use super::*;
    use crate::ledger::{CreditStore, MemoryCreditStore};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[test]
    fn test_build_api_router_creates_router() {
        let _router: Router<AppState> = build_api_router();
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        let store = MemoryCreditStore::with_client("tok", 3);
        let app = build_api_router().with_state(state_with(store.clone()));

        for req in [
            get("/memes", None),
            get("/balance", None),
            post_json("/addtokens", None, r#"{"amount":5}"#),
        ] {
            let resp = app.clone().oneshot(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        }
        assert_eq!(store.balance("tok").unwrap(), Some(3));
    }

    #[test]
    fn test_build_cors_layer_with_origins() {
        let mut config = Config::default();
        config.server.cors_origins = vec!["http://localhost:3000".to_string()];
        let _cors = build_cors_layer(&config);
    }

    #[tokio::test]
    async fn test_build_app_sets_request_id() {
        let app = build_app(state_with(MemoryCreditStore::new()));
        let resp = app.oneshot(get("/health", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let app = build_app(state_with(MemoryCreditStore::new()));
        let resp = app.oneshot(get("/nope", Some("tok"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_needs_no_token() {
        let app = build_api_router().with_state(state_with(MemoryCreditStore::new()));
        let resp = app.oneshot(get("/health", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
