use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    routing::{get, put},
    Router,
};
use routes::{
    documents::{attach_documents, delete_document, get_document},
    extractors::{
        create_extractor, delete_extractor, get_extractor, list_extractors, ping_extractor,
        purge_extractors,
    },
    liveness::live,
    readiness::ready,
};

pub mod api_state;
pub mod error;
mod routes;

pub use routes::fallback::not_implemented;

/// Router for API functionality, version 1
///
/// Any method and path pair without a handler answers 501.
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    Router::new()
        .route("/ready", get(ready))
        .route("/live", get(live))
        .route("/extractors", get(list_extractors).put(create_extractor))
        .route("/extractors/purge", put(purge_extractors))
        .route(
            "/extractors/{ext_id}",
            get(get_extractor).delete(delete_extractor),
        )
        .route("/extractors/{ext_id}/ping", put(ping_extractor))
        .route(
            "/extractors/{ext_id}/{doc_type}/documents",
            put(attach_documents).layer(DefaultBodyLimit::max(
                app_state.config.upload_max_body_bytes,
            )),
        )
        .route(
            "/extractors/{ext_id}/{doc_type}/documents/{doc_id}",
            get(get_document).delete(delete_document),
        )
        .method_not_allowed_fallback(not_implemented)
        .fallback(not_implemented)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use common::{
        lifecycle::{ExtractorLifecycle, LifecycleSettings},
        storage::{db::SurrealDbClient, store::StorageManager},
        utils::config::AppConfig,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    const BOUNDARY: &str = "extractor-test-boundary";

    async fn test_app() -> Router {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("Failed to start in-memory surrealdb"),
        );
        db.ensure_initialized().await.expect("init schema");

        let config = AppConfig::default();
        let lifecycle = ExtractorLifecycle::new(
            db,
            Arc::new(StorageManager::in_memory()),
            LifecycleSettings::from_config(&config).expect("default settings"),
        );
        let state = ApiState::with_lifecycle(&config, lifecycle);

        api_routes_v1(&state).with_state(state)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.expect("router response");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        (status, body.to_vec())
    }

    async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = send(app, request).await;
        let value = serde_json::from_slice(&body).expect("json body");
        (status, value)
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn multipart_request(uri: &str, files: &[(&str, &str)]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, content) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(content.as_bytes());
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("PUT")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request")
    }

    async fn create(app: &Router) -> String {
        let (status, value) = send_json(
            app,
            json_request(
                "PUT",
                "/extractors",
                json!({ "name": "bids", "description": "quarterly", "owner": "ignored" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        value["body"]["id"]
            .as_str()
            .expect("created id")
            .to_string()
    }

    #[tokio::test]
    async fn health_endpoints_answer_ok() {
        let app = test_app().await;
        let (status, _) = send(&app, request("GET", "/live")).await;
        assert_eq!(status, StatusCode::OK);
        let (status, value) = send_json(&app, request("GET", "/ready")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["status"], "ok");
    }

    #[tokio::test]
    async fn create_read_and_list_use_body_envelope() {
        let app = test_app().await;

        let (status, value) = send_json(&app, request("GET", "/extractors")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value, json!({ "body": [] }));

        let id = create(&app).await;

        let (status, value) = send_json(&app, request("GET", &format!("/extractors/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["body"]["name"], "bids");
        assert_eq!(value["body"]["documents"], json!([]));

        let (status, value) = send_json(&app, request("GET", "/extractors")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["body"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn create_rejects_bad_input() {
        let app = test_app().await;

        let (status, value) = send_json(
            &app,
            json_request("PUT", "/extractors", json!({ "name": "only name" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["status"], "error");

        let malformed = Request::builder()
            .method("PUT")
            .uri("/extractors")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .expect("request");
        let (status, _) = send(&app, malformed).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unrouted_requests_are_not_implemented() {
        let app = test_app().await;

        let (status, value) = send_json(&app, request("PATCH", "/extractors")).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert_eq!(value["error"], "PATCH /extractors");

        let (status, _) = send(&app, request("GET", "/unknown/route")).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);

        let (status, _) = send(&app, request("GET", "/extractors/purge")).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn missing_extractor_is_not_found() {
        let app = test_app().await;

        let (status, _) = send(&app, request("GET", "/extractors/ghost")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, request("PUT", "/extractors/ghost/ping")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(
            &app,
            multipart_request("/extractors/ghost/RFP/documents", &[("a.pdf", "1")]),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ping_returns_refreshed_extractor() {
        let app = test_app().await;
        let id = create(&app).await;

        let (status, value) =
            send_json(&app, request("PUT", &format!("/extractors/{id}/ping"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["body"]["id"], json!(id));
    }

    #[tokio::test]
    async fn document_attach_download_and_detach() {
        let app = test_app().await;
        let id = create(&app).await;
        let attach_uri = format!("/extractors/{id}/RFP/documents");

        let (status, value) = send_json(
            &app,
            multipart_request(&attach_uri, &[("report.pdf", "%PDF-1"), ("report.pdf", "%PDF-2")]),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let docs = value["body"].as_array().expect("document list").clone();
        assert_eq!(docs.len(), 2);
        assert_eq!(
            docs[1]["path"],
            json!(format!("extractors/{id}/RFP/report-copy(1).pdf"))
        );

        let doc_id = docs[1]["id"].as_str().expect("doc id").to_string();
        let doc_uri = format!("/extractors/{id}/RFP/documents/{doc_id}");

        let response = app
            .clone()
            .oneshot(request("GET", &doc_uri))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"report-copy(1).pdf\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        assert_eq!(bytes.as_ref(), b"%PDF-2");

        let (status, value) = send_json(&app, request("DELETE", &doc_uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["body"]["id"], json!(doc_id));

        let (status, _) = send(&app, request("GET", &doc_uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, request("DELETE", &doc_uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn attach_without_files_is_bad_request() {
        let app = test_app().await;
        let id = create(&app).await;

        let (status, value) = send_json(
            &app,
            multipart_request(&format!("/extractors/{id}/census/documents"), &[]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["error"], "No files uploaded");
    }

    #[tokio::test]
    async fn delete_then_purge() {
        let app = test_app().await;
        let id = create(&app).await;

        let (status, value) =
            send_json(&app, request("DELETE", &format!("/extractors/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["body"]["status"], "deleted");

        let (status, _) = send(&app, request("GET", &format!("/extractors/{id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, value) = send_json(&app, request("PUT", "/extractors/purge")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value, json!({ "body": [] }));
    }
}
