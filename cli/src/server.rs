use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

use tinysteps_core::db::Database;
use tinysteps_core::models::SyncData;

const BODY_LIMIT: usize = 10 * 1024 * 1024; // 10 MB
const MAX_KEY_LEN: usize = 128;

#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Database>>,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(err) => {
                error!(error = %format!("{err:#}"), "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers ---

fn validate_key(key: &str) -> Result<(), ApiError> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "Invalid key: use up to {MAX_KEY_LEN} letters, digits, '_' or '-'"
        )))
    }
}

async fn get_snapshot(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<SyncData>, ApiError> {
    validate_key(&key)?;
    let snapshot = {
        let db = state.db.lock().unwrap_or_else(PoisonError::into_inner);
        db.get_remote_snapshot(&key).context("database error")?
    };
    snapshot
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Nothing stored under '{key}'")))
}

async fn put_snapshot(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    validate_key(&key)?;
    let data: SyncData = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid snapshot: {e}")))?;

    {
        let db = state.db.lock().unwrap_or_else(PoisonError::into_inner);
        db.put_remote_snapshot(&key, &data)
            .context("database error")?;
    }
    info!(key, entries = data.entries.len(), "stored snapshot");
    Ok(StatusCode::NO_CONTENT)
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/{key}",
            get(get_snapshot).post(put_snapshot).put(put_snapshot),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

// --- Server startup ---

pub async fn start_server(
    db: Database,
    port: u16,
    bind: &str,
    api_key: Option<String>,
    new_api_key: bool,
) -> anyhow::Result<()> {
    let state = AppState {
        db: Arc::new(Mutex::new(db)),
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    match &api_key {
        Some(key) if new_api_key => {
            eprintln!("Generated new API key: {key}");
            eprintln!("Set it on each device: TINYSTEPS_SYNC__API_KEY={key}");
        }
        Some(key) if key.len() >= 8 && key.is_ascii() => eprintln!(
            "API key: {}...{} (see api_key file in data directory)",
            &key[..4],
            &key[key.len() - 4..],
        ),
        Some(_) => eprintln!("API key: see api_key file in data directory"),
        None => {
            eprintln!("Warning: Authentication disabled (--no-auth). Snapshots are open to anyone.");
        }
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can read and overwrite snapshots."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("Failed to bind {bind}:{port}"))?;
    eprintln!("Listening on http://{bind}:{port}");
    eprintln!("Point devices at it with: TINYSTEPS_SYNC__ENDPOINT=http://{bind}:{port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
