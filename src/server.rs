//! HTTP and WebSocket server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/documents` | Upload and index a document (multipart field `file`) |
//! | `GET`  | `/documents/{name}/questions` | Question history of a document |
//! | `DELETE` | `/documents/{name}/questions` | Clear the question history |
//! | `GET`  | `/ask` | WebSocket question/answer session |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "no file field in upload" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `embedding_failed` (502),
//! `internal` (500).
//!
//! Session failures are not HTTP errors: they are reported in the close
//! frame of the WebSocket (see [`crate::session`]).

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade},
        ConnectInfo, DefaultBodyLimit, Multipart, Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::answer::AnswerEngine;
use crate::chunk::TextSplitter;
use crate::config::Config;
use crate::embedding;
use crate::error::IngestError;
use crate::generation;
use crate::index::fs::FsIndexStore;
use crate::index::IndexStore;
use crate::ingest::Ingestor;
use crate::metadata::MetadataStore;
use crate::models::{validate_document_name, IngestReport, QuestionRecord};
use crate::rate_limit::RateLimiter;
use crate::session::{Inbound, Session, SessionTransport};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<Ingestor>,
    pub engine: Arc<AnswerEngine>,
    pub limiter: Arc<RateLimiter>,
    pub metadata: MetadataStore,
    /// Raw uploaded documents are kept here.
    pub uploads_dir: PathBuf,
    pub message_cap: u32,
    pub max_upload_bytes: usize,
    pub evict_interval: Duration,
}

impl AppState {
    /// Wire the providers, stores and limiter described by `config`.
    ///
    /// One embedding provider is shared by ingestion and answering so every
    /// index and every question live in the same vector space.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let embedder = embedding::create_provider(&config.embedding)?;
        let generator = generation::create_generator(&config.generation)?;
        let store: Arc<dyn IndexStore> =
            Arc::new(FsIndexStore::new(config.storage.indexes_dir()));

        let ingestor = Ingestor::new(
            store.clone(),
            embedder.clone(),
            TextSplitter::from_config(&config.chunking),
        )
        .with_batch_size(config.embedding.batch_size);

        let engine = AnswerEngine::new(store, embedder, generator)
            .with_top_k(config.retrieval.top_k)
            .with_language(config.generation.language.clone());

        let metadata = MetadataStore::open(&config.db.path).await?;

        Ok(Self {
            ingestor: Arc::new(ingestor),
            engine: Arc::new(engine),
            limiter: Arc::new(RateLimiter::from_config(&config.session)),
            metadata,
            uploads_dir: config.storage.uploads_dir(),
            message_cap: config.session.message_cap,
            max_upload_bytes: config.server.max_upload_mb * 1024 * 1024,
            evict_interval: Duration::from_secs(config.session.evict_interval_secs),
        })
    }

    /// Index `bytes` as `name`, keep the raw file and record the document.
    ///
    /// The raw file is staged under a hidden name before ingestion and only
    /// renamed into `uploads/` once the index is saved, so a failed ingestion
    /// leaves neither a raw file nor a metadata row. A metadata write that
    /// fails after that point leaves the index and raw file in place; the
    /// next upload of the same name replaces both and records the row.
    ///
    /// Errors raised by the pipeline itself are [`IngestError`]s wrapped in
    /// the returned `anyhow::Error`.
    pub async fn store_document(&self, name: &str, bytes: Vec<u8>) -> Result<IngestReport> {
        validate_document_name(name).map_err(|reason| IngestError::InvalidName {
            name: name.to_string(),
            reason,
        })?;

        tokio::fs::create_dir_all(&self.uploads_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.uploads_dir.display()))?;
        let staged = self.uploads_dir.join(format!(".{}.upload", Uuid::new_v4()));
        tokio::fs::write(&staged, &bytes)
            .await
            .with_context(|| format!("Failed to stage upload {}", name))?;

        let report = match self.ingestor.ingest(name, bytes).await {
            Ok(report) => report,
            Err(e) => {
                let _ = tokio::fs::remove_file(&staged).await;
                return Err(e.into());
            }
        };

        if let Err(e) = tokio::fs::rename(&staged, self.uploads_dir.join(name)).await {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(e).with_context(|| format!("Failed to store upload {}", name));
        }

        self.metadata.create_document(name).await?;
        Ok(report)
    }
}

/// Starts the server on the address configured in `[server].bind`.
pub async fn run_server(config: &Config) -> Result<()> {
    let state = AppState::from_config(config).await?;
    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    println!("askpdf listening on http://{}", listener.local_addr()?);
    serve(listener, state).await
}

/// Serve `state` on an already bound listener until the process ends.
///
/// Also runs the periodic rate-limiter eviction for as long as the server
/// is up.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let limiter = state.limiter.clone();
    let interval = state.evict_interval.max(Duration::from_secs(1));
    let evictor = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let evicted = limiter.evict_expired(Instant::now());
            if evicted > 0 {
                tracing::debug!(evicted, "evicted idle rate-limit records");
            }
        }
    });

    let result = axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await;

    evictor.abort();
    result.context("server error")
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/documents",
            axum::routing::post(handle_upload).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route(
            "/documents/{name}/questions",
            get(handle_list_questions).delete(handle_delete_questions),
        )
        .route("/ask", get(handle_ask))
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

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

/// Map a failed upload to the most specific HTTP error.
fn classify_upload_error(err: anyhow::Error) -> AppError {
    match err.downcast_ref::<IngestError>() {
        Some(IngestError::InvalidName { .. } | IngestError::Extraction(_)) => {
            bad_request(err.to_string())
        }
        Some(IngestError::Embedding(_)) => AppError {
            status: StatusCode::BAD_GATEWAY,
            code: "embedding_failed",
            message: err.to_string(),
        },
        _ => internal(format!("{:#}", err)),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /documents ============

/// Handler for `POST /documents`.
///
/// Reads the multipart field `file`, uses its filename as the document
/// name and indexes it synchronously. Re-uploading a name replaces its
/// index.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestReport>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| bad_request("file field has no filename"))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;

        let report = state
            .store_document(&name, bytes.to_vec())
            .await
            .map_err(classify_upload_error)?;
        tracing::info!(document = %name, chunks = report.chunks, "document uploaded");
        return Ok(Json(report));
    }

    Err(bad_request("no file field in upload"))
}

// ============ /documents/{name}/questions ============

#[derive(Serialize)]
struct QuestionsResponse {
    document: String,
    questions: Vec<QuestionRecord>,
}

#[derive(Serialize)]
struct DeletedResponse {
    document: String,
    deleted: u64,
}

async fn require_document(state: &AppState, name: &str) -> Result<(), AppError> {
    match state.metadata.get_document(name).await {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(not_found(format!("document not found: {}", name))),
        Err(e) => Err(internal(format!("{:#}", e))),
    }
}

async fn handle_list_questions(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<QuestionsResponse>, AppError> {
    require_document(&state, &name).await?;
    let questions = state
        .metadata
        .list_questions(&name)
        .await
        .map_err(|e| internal(format!("{:#}", e)))?;
    Ok(Json(QuestionsResponse {
        document: name,
        questions,
    }))
}

async fn handle_delete_questions(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DeletedResponse>, AppError> {
    require_document(&state, &name).await?;
    let deleted = state
        .metadata
        .delete_questions(&name)
        .await
        .map_err(|e| internal(format!("{:#}", e)))?;
    Ok(Json(DeletedResponse {
        document: name,
        deleted,
    }))
}

// ============ GET /ask ============

/// Handler for `GET /ask`. The client is identified by its peer IP.
async fn handle_ask(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let client = peer.ip().to_string();
        let mut transport = WsTransport { socket };
        let outcome = Session::new(&client, &state.limiter, &state.engine)
            .with_history(&state.metadata)
            .with_message_cap(state.message_cap)
            .run(&mut transport)
            .await;
        tracing::info!(
            client = %client,
            answered = outcome.answered,
            reason = outcome.reason.tag(),
            "session ended"
        );
    })
}

/// [`SessionTransport`] over an axum WebSocket.
struct WsTransport {
    socket: WebSocket,
}

#[async_trait::async_trait]
impl SessionTransport for WsTransport {
    async fn recv(&mut self) -> Option<Inbound> {
        loop {
            match self.socket.recv().await? {
                Ok(WsMessage::Text(text)) => return Some(Inbound::Text(text.to_string())),
                Ok(WsMessage::Binary(_)) => return Some(Inbound::Binary),
                Ok(WsMessage::Close(_)) => return Some(Inbound::Close),
                Ok(WsMessage::Ping(_) | WsMessage::Pong(_)) => continue,
                Err(e) => {
                    tracing::debug!(error = %e, "websocket receive failed");
                    return None;
                }
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        self.socket.send(WsMessage::Text(text.into())).await?;
        Ok(())
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        let frame = CloseFrame {
            code,
            reason: reason.to_string().into(),
        };
        self.socket.send(WsMessage::Close(Some(frame))).await?;
        Ok(())
    }
}
