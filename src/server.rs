//! HTTP API for the chat assistant.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Service banner |
//! | `GET`  | `/health` | Status, version and the current corpus stamp |
//! | `POST` | `/upload?session_id=` | Multipart PDF upload (field `file`) |
//! | `POST` | `/chat` | One chat turn: `{ "message", "session_id"? }` |
//!
//! # Error Contract
//!
//! Errors share one envelope:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "only PDF files are allowed" } }
//! ```
//!
//! Error codes: `bad_request` (400), `processing_error` (500), `internal` (500).
//! `/chat` never returns an error for a well-formed request; provider
//! failures come back as an apology in the normal response body.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! can be served from anywhere.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::chat::{Assistant, DEFAULT_SESSION};
use crate::config::{Config, ServerConfig};
use crate::models::{ChatResponse, CorpusInfo};

/// Multipart framing allowance on top of the PDF size limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
struct AppState {
    assistant: Arc<Assistant>,
    max_upload_bytes: usize,
}

/// Starts the HTTP server on `[server].bind` and serves until the process
/// is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let assistant = Arc::new(Assistant::from_config(config).await?);
    let app = router(assistant, &config.server);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "server listening");
    println!("pdfchat listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the application router around an assembled [`Assistant`].
pub fn router(assistant: Arc<Assistant>, server: &ServerConfig) -> Router {
    let state = AppState {
        assistant,
        max_upload_bytes: server.max_upload_bytes,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/upload", post(handle_upload))
        .route("/chat", post(handle_chat))
        .layer(DefaultBodyLimit::max(
            server.max_upload_bytes + MULTIPART_OVERHEAD,
        ))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn processing_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "processing_error".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ GET / ============

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "PDF chat assistant API" }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    /// `null` until the first PDF has been indexed.
    corpus: Option<CorpusInfo>,
}

async fn handle_health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let corpus = state
        .assistant
        .corpus_info()
        .await
        .map_err(|e| internal(format!("{:#}", e)))?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        corpus,
    }))
}

// ============ POST /upload ============

#[derive(Deserialize)]
struct UploadParams {
    session_id: Option<String>,
}

#[derive(Serialize)]
struct UploadResponse {
    message: String,
    filename: String,
    pages: usize,
    tables: usize,
    images: usize,
}

/// Handler for `POST /upload`.
///
/// Validates the file name and size before any processing. A successful
/// upload replaces the corpus for every session and opens the gate for
/// the uploading one.
async fn handle_upload(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let session_id = params
        .session_id
        .unwrap_or_else(|| DEFAULT_SESSION.to_string());

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = validate_filename(field.file_name())?;
        let bytes = field.bytes().await.map_err(|e| {
            bad_request(format!(
                "file could not be read (limit is {} bytes): {}",
                state.max_upload_bytes, e
            ))
        })?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) =
        upload.ok_or_else(|| bad_request("multipart field 'file' is required"))?;
    validate_size(bytes.len(), state.max_upload_bytes)?;

    let summary = state
        .assistant
        .ingest(&bytes, &session_id)
        .await
        .map_err(|e| {
            tracing::error!(%filename, error = %e, "upload processing failed");
            processing_error(format!("Error processing PDF: {}", e))
        })?;

    tracing::info!(%filename, %session_id, pages = summary.pages, "upload processed");
    Ok(Json(UploadResponse {
        message: "PDF processed successfully".to_string(),
        filename,
        pages: summary.pages,
        tables: summary.tables,
        images: summary.images,
    }))
}

fn validate_filename(name: Option<&str>) -> Result<String, AppError> {
    match name {
        Some(name) if name.to_ascii_lowercase().ends_with(".pdf") => Ok(name.to_string()),
        _ => Err(bad_request("only PDF files are allowed")),
    }
}

fn validate_size(len: usize, max: usize) -> Result<(), AppError> {
    if len > max {
        return Err(bad_request(format!(
            "file size {} exceeds the {} byte limit",
            len, max
        )));
    }
    Ok(())
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Json<ChatResponse> {
    let session_id = request
        .session_id
        .unwrap_or_else(|| DEFAULT_SESSION.to_string());
    Json(state.assistant.converse(&request.message, &session_id).await)
}
