use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower::ServiceExt;

use maas::AppState;
use maas::api;
use maas::config::Config;
use maas::db::Database;
use maas::generator::MemeGenerator;
use maas::ledger::{CreditStore, SqliteCreditStore};
use maas::metering::{Meter, spawn_call_logger};

/// A fully wired application over a fresh on-disk database.
pub struct TestApp {
    pub app: Router,
    pub store: SqliteCreditStore,
    pub call_logger: JoinHandle<()>,
    _dir: tempfile::TempDir,
}

impl TestApp {
    pub fn new(clients: &[(&str, i64)]) -> Self {
        Self::with_config(Config::default(), clients)
    }

    pub fn with_config(config: Config, clients: &[(&str, i64)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("maas.db")).unwrap();
        let store = SqliteCreditStore::new(db);
        for (token, balance) in clients {
            store.register(token, *balance).unwrap();
        }

        let shared: Arc<dyn CreditStore> = Arc::new(store.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        let call_logger = spawn_call_logger(shared.clone(), rx);
        let meter = Meter::new(shared, tx)
            .reject_non_positive_credit(config.metering.reject_non_positive_credit);

        let state = AppState {
            config: Arc::new(config),
            meter: Arc::new(meter),
            generator: Arc::new(MemeGenerator::from_seed(42)),
        };

        Self {
            app: api::build_app(state),
            store,
            call_logger,
            _dir: dir,
        }
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    pub fn balance(&self, token: &str) -> Option<i64> {
        self.store.balance(token).unwrap()
    }

    /// Drop the app and wait until every call record has been written.
    pub async fn drain_calls(self) -> (SqliteCreditStore, i64) {
        let Self {
            app,
            store,
            call_logger,
            _dir,
        } = self;
        drop(app);
        call_logger.await.unwrap();
        let count = store
            .db()
            .with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM api_calls", [], |row| row.get(0)))
            .unwrap();
        (store, count)
    }
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(t) = token {
        builder = builder.header(header::AUTHORIZATION, t);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn add_tokens(token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/addtokens")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(t) = token {
        builder = builder.header(header::AUTHORIZATION, t);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}
