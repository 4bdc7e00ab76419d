//! HTTP REST API server.
//!
//! Exposes semantic search, grounded answers, health and metrics.

use crate::context::AppContext;
use crate::metrics::Outcome;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tomo_retrieval::{RetrievalError, RetrievedPassage};
use tower_http::cors::{Any, CorsLayer};

/// HTTP server for REST API endpoints.
///
/// Provides:
/// - POST /api/search - Ranked passages gated by the relevance threshold
/// - POST /api/answer - Passages plus a generated answer
/// - GET /health - Index and generator status
/// - GET /metrics - Prometheus metrics
pub struct HttpServer {
    addr: SocketAddr,
    context: Arc<AppContext>,
    enable_cors: bool,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    server_handle: Option<JoinHandle<Result<(), std::io::Error>>>,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, context: Arc<AppContext>) -> Self {
        Self {
            addr,
            context,
            enable_cors: false,
            local_addr: None,
            shutdown_tx: None,
            server_handle: None,
        }
    }

    /// Allow cross-origin requests from any origin.
    pub fn with_cors(mut self, enable: bool) -> Self {
        self.enable_cors = enable;
        self
    }

    /// Address the server is bound to, once started. Differs from the
    /// configured address when that used port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Routes without the listener, for embedding in other servers.
    pub fn router(context: Arc<AppContext>, enable_cors: bool) -> Router {
        let router = Router::new()
            .route("/api/search", post(search_handler))
            .route("/api/answer", post(answer_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(context);

        if enable_cors {
            router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
        } else {
            router
        }
    }

    /// Start the HTTP server.
    pub async fn start(&mut self) -> Result<(), HttpServerError> {
        tracing::info!("Starting HTTP server on {}", self.addr);

        let app = Self::router(Arc::clone(&self.context), self.enable_cors);

        // Create shutdown signal
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        self.shutdown_tx = Some(shutdown_tx);

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| HttpServerError::Startup(format!("Failed to bind: {}", e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| HttpServerError::Startup(format!("No local address: {}", e)))?;
        self.local_addr = Some(local_addr);

        let server_handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
        });

        self.server_handle = Some(server_handle);

        tracing::info!("HTTP server listening on {}", local_addr);
        Ok(())
    }

    /// Shutdown the HTTP server gracefully.
    pub async fn shutdown(mut self) -> Result<(), HttpServerError> {
        tracing::info!("Shutting down HTTP server");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.server_handle.take() {
            handle
                .await
                .map_err(|e| HttpServerError::Shutdown(format!("Join error: {}", e)))?
                .map_err(|e| HttpServerError::Shutdown(format!("Server error: {}", e)))?;
        }

        tracing::info!("HTTP server shutdown complete");
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub question: String,
    /// Defaults to the configured `top_k`.
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<RetrievedPassage>,
    pub no_relevant_result: bool,
    pub best_score: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub question: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub results: Vec<RetrievedPassage>,
    pub answer: Option<String>,
    pub generation_error: Option<String>,
    pub no_relevant_result: bool,
    pub best_score: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub backend: String,
    pub chunks: usize,
    pub dimensions: usize,
    pub generator: bool,
}

/// Semantic search endpoint handler.
///
/// POST /api/search
async fn search_handler(
    State(context): State<Arc<AppContext>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let started = Instant::now();
    let result = run_search(Arc::clone(&context), request).await;

    let outcome = match &result {
        Ok(response) if response.no_relevant_result => Outcome::NoRelevantResult,
        Ok(_) => Outcome::Relevant,
        Err(e) => e.outcome(),
    };
    context.metrics.record("search", outcome, started.elapsed());

    result.map(Json)
}

async fn run_search(
    context: Arc<AppContext>,
    request: SearchRequest,
) -> Result<SearchResponse, AppError> {
    let question = non_blank(request.question)?;
    let top_k = request
        .top_k
        .unwrap_or(context.retriever.config().top_k);

    let retrieval =
        tokio::task::spawn_blocking(move || context.retriever.retrieve(&question, top_k))
            .await??;

    Ok(SearchResponse {
        no_relevant_result: !retrieval.is_relevant(),
        best_score: retrieval.best_score(),
        results: retrieval.into_passages(),
    })
}

/// Grounded answer endpoint handler.
///
/// POST /api/answer
async fn answer_handler(
    State(context): State<Arc<AppContext>>,
    Json(request): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>, AppError> {
    let started = Instant::now();
    let result = run_answer(Arc::clone(&context), request).await;

    let outcome = match &result {
        Ok(response) if response.no_relevant_result => Outcome::NoRelevantResult,
        Ok(_) => Outcome::Relevant,
        Err(e) => e.outcome(),
    };
    context.metrics.record("answer", outcome, started.elapsed());

    result.map(Json)
}

async fn run_answer(
    context: Arc<AppContext>,
    request: AnswerRequest,
) -> Result<AnswerResponse, AppError> {
    let question = non_blank(request.question)?;

    let answer = tokio::task::spawn_blocking(move || context.retriever.answer(&question)).await??;

    Ok(AnswerResponse {
        results: answer.passages,
        answer: answer.answer,
        generation_error: answer.generation_error,
        no_relevant_result: answer.no_relevant_result,
        best_score: answer.best_score,
    })
}

fn non_blank(question: String) -> Result<String, AppError> {
    if question.trim().is_empty() {
        return Err(AppError::bad_request("question must not be empty"));
    }
    Ok(question)
}

/// Health check endpoint handler.
///
/// GET /health
async fn health_handler(State(context): State<Arc<AppContext>>) -> Json<HealthStatus> {
    let retriever = &context.retriever;
    Json(HealthStatus {
        status: if retriever.is_empty() { "empty" } else { "healthy" }.to_string(),
        backend: retriever.backend().to_string(),
        chunks: retriever.len(),
        dimensions: retriever.dimensions(),
        generator: retriever.has_generator(),
    })
}

/// Metrics endpoint handler.
///
/// GET /metrics
///
/// Returns Prometheus-formatted metrics.
async fn metrics_handler(State(context): State<Arc<AppContext>>) -> Result<Response, AppError> {
    let metrics = context
        .metrics
        .export()
        .map_err(|e| AppError::internal(anyhow::anyhow!("failed to encode metrics: {}", e)))?;

    Ok((
        StatusCode::OK,
        [(
            "content-type",
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        metrics,
    )
        .into_response())
}

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    #[error("Startup error: {0}")]
    Startup(String),

    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

/// Application error wrapper for handlers.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: anyhow::anyhow!("{}", message),
        }
    }

    fn internal(error: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error,
        }
    }

    fn outcome(&self) -> Outcome {
        match self.status {
            StatusCode::BAD_REQUEST => Outcome::BadRequest,
            StatusCode::SERVICE_UNAVAILABLE => Outcome::Unavailable,
            _ => Outcome::Error,
        }
    }
}

impl From<RetrievalError> for AppError {
    fn from(err: RetrievalError) -> Self {
        let status = if err.is_bad_request() {
            StatusCode::BAD_REQUEST
        } else if matches!(err, RetrievalError::RetrievalUnavailable(_)) {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            error: err.into(),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::internal(anyhow::anyhow!("retrieval task failed: {}", err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("Handler error: {:#}", self.error);
        } else {
            tracing::debug!("Rejected request: {:#}", self.error);
        }
        (
            self.status,
            Json(serde_json::json!({ "error": format!("{:#}", self.error) })),
        )
            .into_response()
    }
}
