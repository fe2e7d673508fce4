#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Full HTTP round trip: upload a document, chat against it, inspect and
// clear the session, all through the router with a mocked provider.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ragserve::chunking::ChunkingConfig;
use ragserve::config::{Config, HistoryConfig, ProviderConfig, ServerConfig};
use ragserve::rag::RagEngine;
use ragserve::server::router;

const BOUNDARY: &str = "integration-boundary";

async fn start_provider() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(|request: &wiremock::Request| {
            let body: serde_json::Value =
                serde_json::from_slice(&request.body).expect("request body is JSON");
            let count = body["input"].as_array().expect("input array").len();
            let data: Vec<serde_json::Value> = (0..count)
                .map(|i| json!({"index": i, "embedding": [0.1, 0.2, 0.3]}))
                .collect();
            ResponseTemplate::new(200).set_body_json(json!({"data": data}))
        })
        .mount(&server)
        .await;

    let chat_body = format!(
        "data: {}\ndata: {}\ndata: [DONE]\n",
        json!({"choices": [{"delta": {"content": "The document "}}]}),
        json!({"choices": [{"delta": {"content": "says hello."}}]}),
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(chat_body, "text/event-stream"))
        .mount(&server)
        .await;

    server
}

fn app_for(server: &MockServer) -> (axum::Router, Arc<RagEngine>) {
    let engine = Arc::new(RagEngine::new(Config {
        provider: ProviderConfig {
            base_url: server.uri(),
            ..ProviderConfig::default()
        },
        chunking: ChunkingConfig::default(),
        history: HistoryConfig::default(),
        server: ServerConfig::default(),
        base_dir: std::path::PathBuf::new(),
    }));
    (router(Arc::clone(&engine)), engine)
}

fn upload_request(session_id: &str, text: &str) -> Request<Body> {
    let mut body = String::new();
    body.push_str(&format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"guide.txt\"\r\n\r\n{text}\r\n"
    ));
    for (name, value) in [("api_key", "test-key"), ("session_id", session_id)] {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));

    Request::post("/api/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request builds")
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body is JSON")
}

#[tokio::test]
async fn upload_chat_status_clear_round_trip() {
    let provider = start_provider().await;
    let (app, engine) = app_for(&provider);

    // Upload and index a document for the session.
    let response = app
        .clone()
        .oneshot(upload_request("trip", "a short guide to greetings"))
        .await
        .expect("upload request succeeds");
    assert_eq!(response.status(), StatusCode::OK);
    let upload = json_body(response).await;
    assert_eq!(upload["filename"], "guide.txt");
    assert_eq!(upload["chunks_created"], 1);

    // Status reflects the index.
    let response = app
        .clone()
        .oneshot(
            Request::get("/api/status/trip")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("status request succeeds");
    let status = json_body(response).await;
    assert_eq!(status["has_index"], true);
    assert_eq!(status["filename"], "guide.txt");
    assert_eq!(status["chunks"], 1);

    // Chat streams the completion and commits the exchange.
    let response = app
        .clone()
        .oneshot(
            Request::post("/api/chat")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({
                        "developer_message": "Answer from the document.",
                        "user_message": "what does it say?",
                        "api_key": "test-key",
                        "session_id": "trip",
                    })
                    .to_string(),
                ))
                .expect("request builds"),
        )
        .await
        .expect("chat request succeeds");
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    assert_eq!(&bytes[..], b"The document says hello.");
    assert_eq!(engine.history().get_context("trip").len(), 2);

    // Clear both sides of the session.
    let response = app
        .clone()
        .oneshot(
            Request::delete("/api/index/trip")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("clear index succeeds");
    assert_eq!(json_body(response).await["cleared"], true);

    let response = app
        .clone()
        .oneshot(
            Request::delete("/api/history/trip")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("clear history succeeds");
    assert_eq!(json_body(response).await["cleared"], true);

    // Both clears are now no-ops reported as such.
    let response = app
        .oneshot(
            Request::delete("/api/index/trip")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("second clear succeeds");
    let body = json_body(response).await;
    assert_eq!(body["cleared"], false);
    assert_eq!(body["message"], "No index found for this session");
}

#[tokio::test]
async fn health_endpoint_lists_features() {
    let provider = start_provider().await;
    let (app, _engine) = app_for(&provider);

    let response = app
        .oneshot(
            Request::get("/api/health")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("health request succeeds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert!(
        body["features"]
            .as_array()
            .expect("features array")
            .iter()
            .any(|f| f == "rag")
    );
}
