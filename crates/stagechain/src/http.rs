//! HTTP surface: protect and stage-fetch endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use stagechain_core::now_millis;
use stagechain_store::{SqliteStore, StageStore};

use crate::config::ServerConfig;
use crate::delivery::{StageRequest, StageServer};
use crate::error::{ProtectError, ServerError};
use crate::protect::Protector;

const SCRIPT_REQUIRED: &str = "Script content is required.";
const PROTECT_FAILED: &str = "Failed to protect script.";

/// Shared handler state.
pub struct AppState<S: StageStore> {
    protector: Arc<Protector<S>>,
    server: Arc<StageServer<S>>,
}

impl<S: StageStore> AppState<S> {
    /// Bundle a protector and a stage server.
    pub fn new(protector: Protector<S>, server: StageServer<S>) -> Self {
        Self {
            protector: Arc::new(protector),
            server: Arc::new(server),
        }
    }

    /// The protector behind `POST /api/protect`.
    pub fn protector(&self) -> &Protector<S> {
        &self.protector
    }
}

impl<S: StageStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            protector: Arc::clone(&self.protector),
            server: Arc::clone(&self.server),
        }
    }
}

/// Body of `POST /api/protect`.
#[derive(Debug, Deserialize)]
pub struct ProtectRequest {
    /// The script to protect.
    pub script: Option<String>,
}

/// Successful response of `POST /api/protect`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectResponse {
    /// The statement that starts the chain.
    pub entry_point: String,
}

/// Build the application router.
pub fn router<S: StageStore + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/api/protect", post(protect::<S>))
        .route("/api/scripts/:id", get(fetch_stage::<S>))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn protect<S: StageStore + 'static>(
    State(state): State<AppState<S>>,
    body: Result<Json<ProtectRequest>, JsonRejection>,
) -> Response {
    let script = match body {
        Ok(Json(ProtectRequest {
            script: Some(script),
        })) if !script.trim().is_empty() => script,
        _ => return script_required(),
    };

    match state.protector.protect(&script).await {
        Ok(outcome) => Json(ProtectResponse {
            entry_point: outcome.entry_point,
        })
        .into_response(),
        Err(ProtectError::InvalidInput(_)) => script_required(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": PROTECT_FAILED, "details": e.to_string() })),
        )
            .into_response(),
    }
}

fn script_required() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": SCRIPT_REQUIRED })),
    )
        .into_response()
}

async fn fetch_stage<S: StageStore + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let request = stage_request(id, &headers);

    match state.server.serve(&request, now_millis()).await {
        Ok(content) => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            content,
        )
            .into_response(),
        Err(rejection) => (rejection.status(), rejection.body()).into_response(),
    }
}

/// Translate an HTTP request into a transport-independent stage request.
fn stage_request(id: String, headers: &HeaderMap) -> StageRequest {
    let mut request = StageRequest::new(id);
    if let Some(agent) = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
    {
        request = request.client(agent);
    }
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            request = request.header(name.as_str(), value);
        }
    }
    request
}

async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// Shortest interval the purge task will tick at.
pub const MIN_PURGE_INTERVAL: Duration = Duration::from_secs(1);

/// Periodically delete expired stages.
///
/// Reads never depend on this task; it only reclaims space. `every` is
/// raised to [`MIN_PURGE_INTERVAL`] when shorter.
pub fn spawn_purge_task<S: StageStore + 'static>(
    store: Arc<S>,
    every: Duration,
) -> JoinHandle<()> {
    let every = every.max(MIN_PURGE_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match store.purge_expired(now_millis()).await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "purged expired stages"),
                Err(e) => error!(error = %e, "expiry purge failed"),
            }
        }
    })
}

/// Open the database and serve until the listener fails.
pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let store = Arc::new(SqliteStore::open(&config.db_path)?);
    let protector = Protector::new(Arc::clone(&store), config.chain_config())?;
    let server = StageServer::new(Arc::clone(&store), config.delivery_policy());
    let app = router(AppState::new(protector, server));

    let purge = spawn_purge_task(store, config.purge_interval);

    let listener = tokio::net::TcpListener::bind(&config.addr).await?;
    info!(addr = %config.addr, db = %config.db_path.display(), "stagechain listening");
    let result = axum::serve(listener, app).await;
    purge.abort();
    Ok(result?)
}
