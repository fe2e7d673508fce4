use super::*;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{method as http_method, path as url_path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::{HistoryConfig, ProviderConfig, ServerConfig};

const BOUNDARY: &str = "test-boundary";

fn test_engine(base_url: &str) -> Arc<RagEngine> {
    let config = Config {
        provider: ProviderConfig {
            base_url: base_url.to_string(),
            ..ProviderConfig::default()
        },
        chunking: crate::chunking::ChunkingConfig::default(),
        history: HistoryConfig::default(),
        server: ServerConfig::default(),
        base_dir: std::path::PathBuf::new(),
    };
    Arc::new(RagEngine::new(config))
}

fn multipart_body(fields: &[(&str, Option<&str>, &str)]) -> (String, String) {
    let mut body = String::new();
    for (name, file_name, value) in fields {
        body.push_str(&format!("--{BOUNDARY}\r\n"));
        match file_name {
            Some(file_name) => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\r\n"
            )),
            None => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
            )),
        }
        body.push_str(value);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    (
        format!("multipart/form-data; boundary={BOUNDARY}"),
        body,
    )
}

async fn mount_embeddings(server: &MockServer) {
    Mock::given(http_method("POST"))
        .and(url_path("/embeddings"))
        .respond_with(move |request: &wiremock::Request| {
            let body: serde_json::Value =
                serde_json::from_slice(&request.body).expect("request body is JSON");
            let count = body["input"].as_array().expect("input array").len();
            let data: Vec<serde_json::Value> = (0..count)
                .map(|i| json!({"index": i, "embedding": [0.5, 0.5, 0.5]}))
                .collect();
            ResponseTemplate::new(200).set_body_json(json!({"data": data}))
        })
        .mount(server)
        .await;
}

async fn mount_chat(server: &MockServer, fragments: &[&str]) {
    let mut body = String::new();
    for fragment in fragments {
        body.push_str(&format!(
            "data: {}\n",
            json!({"choices": [{"delta": {"content": fragment}}]})
        ));
    }
    body.push_str("data: [DONE]\n");
    Mock::given(http_method("POST"))
        .and(url_path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(server)
        .await;
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body is JSON")
}

#[tokio::test]
async fn health_reports_ok() {
    let app = router(test_engine("http://localhost"));

    let response = app
        .oneshot(
            Request::get("/api/health")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn status_of_unknown_session_has_no_index() {
    let app = router(test_engine("http://localhost"));

    let response = app
        .oneshot(
            Request::get("/api/status/nobody")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["has_index"], false);
    assert_eq!(body["chunks"], 0);
    assert!(body["filename"].is_null());
}

#[tokio::test]
async fn clear_endpoints_report_nothing_to_clear() {
    let app = router(test_engine("http://localhost"));

    let response = app
        .clone()
        .oneshot(
            Request::delete("/api/index/ghost")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("request succeeds");
    let body = body_json(response).await;
    assert_eq!(body["cleared"], false);

    let response = app
        .oneshot(
            Request::delete("/api/history/ghost")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("request succeeds");
    let body = body_json(response).await;
    assert_eq!(body["cleared"], false);
}

#[tokio::test]
async fn upload_ingests_document_and_reports_chunks() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;
    let engine = test_engine(&server.uri());
    let app = router(Arc::clone(&engine));

    let (content_type, body) = multipart_body(&[
        ("file", Some("notes.txt"), "some document text to index"),
        ("api_key", None, "test-key"),
        ("session_id", None, "s1"),
        ("chunk_size", None, "20"),
        ("chunk_overlap", None, "5"),
    ]);
    let response = app
        .oneshot(
            Request::post("/api/upload")
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .expect("request builds"),
        )
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["filename"], "notes.txt");
    assert_eq!(body["session_id"], "s1");
    assert!(body["chunks_created"].as_u64().expect("count") > 0);

    let status = engine.status("s1");
    assert!(status.has_index);
    assert_eq!(status.filename.as_deref(), Some("notes.txt"));
}

#[tokio::test]
async fn upload_without_file_is_rejected() {
    let app = router(test_engine("http://localhost"));

    let (content_type, body) = multipart_body(&[("api_key", None, "test-key")]);
    let response = app
        .oneshot(
            Request::post("/api/upload")
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .expect("request builds"),
        )
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_with_bad_chunk_params_is_rejected() {
    let app = router(test_engine("http://localhost"));

    let (content_type, body) = multipart_body(&[
        ("file", Some("notes.txt"), "text"),
        ("api_key", None, "test-key"),
        ("chunk_size", None, "100"),
        ("chunk_overlap", None, "100"),
    ]);
    let response = app
        .oneshot(
            Request::post("/api/upload")
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .expect("request builds"),
        )
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_of_empty_document_is_rejected() {
    let app = router(test_engine("http://localhost"));

    let (content_type, body) = multipart_body(&[
        ("file", Some("empty.txt"), ""),
        ("api_key", None, "test-key"),
    ]);
    let response = app
        .oneshot(
            Request::post("/api/upload")
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .expect("request builds"),
        )
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chat_streams_response_and_commits_history() {
    let server = MockServer::start().await;
    mount_chat(&server, &["streamed ", "text"]).await;
    let engine = test_engine(&server.uri());
    let app = router(Arc::clone(&engine));

    let request_body = json!({
        "developer_message": "You are helpful.",
        "user_message": "hello?",
        "api_key": "test-key",
        "session_id": "s1",
    });
    let response = app
        .oneshot(
            Request::post("/api/chat")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(request_body.to_string()))
                .expect("request builds"),
        )
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    assert_eq!(&bytes[..], b"streamed text");

    let context = engine.history().get_context("s1");
    assert_eq!(context.len(), 2);
    assert_eq!(context[1].content, "streamed text");
}

#[tokio::test]
async fn chat_with_failing_provider_maps_to_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(http_method("POST"))
        .and(url_path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let engine = test_engine(&server.uri());
    let app = router(Arc::clone(&engine));

    let request_body = json!({
        "developer_message": "You are helpful.",
        "user_message": "hello?",
        "api_key": "test-key",
    });
    let response = app
        .oneshot(
            Request::post("/api/chat")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(request_body.to_string()))
                .expect("request builds"),
        )
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(engine.history().get_context("default").is_empty());
}
