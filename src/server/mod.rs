#[cfg(test)]
mod tests;

use std::sync::Arc;

use async_stream::stream;
use axum::body::{Body, Bytes};
use axum::extract::{Multipart, Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::rag::{AnswerRequest, IngestRequest, RagEngine};
use crate::{RagError, Result};

/// Chat request body, matching the service's public API
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub developer_message: String,
    pub user_message: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub api_key: String,
    #[serde(default = "default_session_id")]
    pub session_id: String,
    #[serde(default = "default_num_chunks")]
    pub num_chunks_to_retrieve: usize,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_session_id() -> String {
    "default".to_string()
}

fn default_num_chunks() -> usize {
    3
}

/// Error type for HTTP handlers: an engine error plus the status it maps to
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<RagError> for ApiError {
    #[inline]
    fn from(error: RagError) -> Self {
        let status = match &error {
            RagError::Config(_) | RagError::EmptyInput(_) => StatusCode::BAD_REQUEST,
            RagError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            RagError::EmbeddingProvider(_) | RagError::CompletionProvider(_) => {
                StatusCode::BAD_GATEWAY
            }
            RagError::Io(_) | RagError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    #[inline]
    fn into_response(self) -> Response {
        (self.status, Json(json!({"error": self.message}))).into_response()
    }
}

/// Build the service router around a shared engine.
#[inline]
pub fn router(engine: Arc<RagEngine>) -> Router {
    let permissive_cors = engine.config().server.permissive_cors;

    let mut router = Router::new()
        .route("/api/health", get(health))
        .route("/api/upload", post(upload))
        .route("/api/chat", post(chat))
        .route("/api/status/{session_id}", get(session_status))
        .route("/api/index/{session_id}", delete(clear_index))
        .route("/api/history/{session_id}", delete(clear_history))
        .layer(TraceLayer::new_for_http());

    if permissive_cors {
        router = router.layer(CorsLayer::permissive());
    }

    router.with_state(engine)
}

/// Bind and serve until shutdown.
#[inline]
pub async fn serve(config: Config) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let engine = Arc::new(RagEngine::new(config));
    let app = router(engine);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "features": ["chat", "document-upload", "rag", "conversation-memory"],
    }))
}

async fn session_status(
    State(engine): State<Arc<RagEngine>>,
    Path(session_id): Path<String>,
) -> Json<serde_json::Value> {
    let status = engine.status(&session_id);
    Json(json!({
        "has_index": status.has_index,
        "filename": status.filename,
        "chunks": status.chunks,
    }))
}

async fn clear_index(
    State(engine): State<Arc<RagEngine>>,
    Path(session_id): Path<String>,
) -> Json<serde_json::Value> {
    let cleared = engine.clear_index(&session_id);
    let message = if cleared {
        "Index cleared successfully"
    } else {
        "No index found for this session"
    };
    Json(json!({"cleared": cleared, "message": message}))
}

async fn clear_history(
    State(engine): State<Arc<RagEngine>>,
    Path(session_id): Path<String>,
) -> Json<serde_json::Value> {
    let cleared = engine.clear_history(&session_id);
    let message = if cleared {
        "Conversation history cleared successfully"
    } else {
        "No conversation history found for this session"
    };
    Json(json!({"cleared": cleared, "message": message}))
}

/// Document upload: multipart form with `file` (UTF-8 text), `api_key`, and
/// optional `session_id`, `chunk_size`, `chunk_overlap`. Text extraction
/// from richer formats happens upstream; this endpoint takes the extracted
/// text as-is.
async fn upload(
    State(engine): State<Arc<RagEngine>>,
    mut multipart: Multipart,
) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    let defaults = engine.config().chunking.clone();
    let mut raw_text = None;
    let mut filename = None;
    let mut api_key = None;
    let mut session_id = default_session_id();
    let mut chunking = defaults;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                filename = Some(
                    field
                        .file_name()
                        .unwrap_or("uploaded-document")
                        .to_string(),
                );
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to read file: {e}")))?;
                let text = String::from_utf8(bytes.to_vec()).map_err(|_| {
                    ApiError::bad_request("uploaded file must be UTF-8 text")
                })?;
                raw_text = Some(text);
            }
            "api_key" => api_key = Some(read_text_field(field).await?),
            "session_id" => session_id = read_text_field(field).await?,
            "chunk_size" => {
                chunking.chunk_size = parse_field(&read_text_field(field).await?, "chunk_size")?;
            }
            "chunk_overlap" => {
                chunking.chunk_overlap =
                    parse_field(&read_text_field(field).await?, "chunk_overlap")?;
            }
            _ => {}
        }
    }

    let raw_text = raw_text.ok_or_else(|| ApiError::bad_request("missing 'file' field"))?;
    let filename = filename.unwrap_or_else(|| "uploaded-document".to_string());
    let api_key = api_key.ok_or_else(|| ApiError::bad_request("missing 'api_key' field"))?;

    let outcome = engine
        .ingest(IngestRequest {
            session_id,
            filename,
            raw_text,
            chunking,
            api_key,
        })
        .await?;

    Ok(Json(json!({
        "message": "Document uploaded and indexed successfully",
        "filename": outcome.filename,
        "session_id": outcome.session_id,
        "chunks_created": outcome.chunks_created,
    })))
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> std::result::Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid form field: {e}")))
}

fn parse_field(value: &str, name: &str) -> std::result::Result<usize, ApiError> {
    value
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("'{name}' must be a non-negative integer")))
}

/// Chat endpoint: streams plain-text fragments. The conversation turn is
/// committed only once the stream has been sent in full; a provider failure
/// or client disconnect mid-stream leaves history untouched.
async fn chat(
    State(engine): State<Arc<RagEngine>>,
    Json(request): Json<ChatRequest>,
) -> std::result::Result<Response, ApiError> {
    let pending = engine
        .answer(AnswerRequest {
            session_id: request.session_id,
            developer_message: request.developer_message,
            user_message: request.user_message,
            model: request.model,
            api_key: request.api_key,
            num_chunks: request.num_chunks_to_retrieve,
        })
        .await?;

    let mut fragments = pending.fragments;
    let commit = pending.commit;
    let body_stream = stream! {
        let mut full_response = String::new();
        while let Some(fragment) = fragments.next().await {
            match fragment {
                Ok(text) => {
                    full_response.push_str(&text);
                    yield Ok::<Bytes, std::io::Error>(Bytes::from(text));
                }
                Err(e) => {
                    error!("Completion stream failed mid-response: {e}");
                    yield Err(std::io::Error::other(e.to_string()));
                    return;
                }
            }
        }
        commit.commit(&full_response);
    };

    let response = Response::builder()
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(body_stream))
        .map_err(|e| RagError::Other(e.into()))?;

    Ok(response)
}
