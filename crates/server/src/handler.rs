//! HTTP front end.
//!
//! Every request that is not a control endpoint is handed to the worker as an
//! intercepted fetch. Origin-form targets resolve against the configured
//! origin; absolute-form targets (proxy style) are used as-is.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::{self, Body},
    extract::State,
    http::{Request as HttpRequest, Uri},
    response::{IntoResponse, Response as HttpResponse},
    routing::{get, post},
};
use bytes::Bytes;
use seamcache_client::canonicalize;
use seamcache_core::{Destination, Request, Response};
use serde_json::json;
use url::Url;

use crate::error::HttpError;
use crate::worker::{Worker, WorkerStatus};

pub const MESSAGE_PATH: &str = "/__worker/message";
pub const STATUS_PATH: &str = "/__worker/status";
pub const ACTIVATE_PATH: &str = "/__worker/activate";

#[derive(Clone)]
pub struct AppState {
    pub worker: Arc<Worker>,
    pub origin: Url,
    /// Largest request body accepted for forwarding.
    pub body_limit: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(MESSAGE_PATH, post(message))
        .route(STATUS_PATH, get(status))
        .route(ACTIVATE_PATH, post(activate))
        .fallback(proxy)
        .with_state(state)
}

/// Control message channel. Accepted messages are applied in the background.
async fn message(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse, HttpError> {
    let outcome = state.worker.message(&body)?;
    Ok((http::StatusCode::ACCEPTED, Json(json!({ "outcome": outcome }))))
}

async fn status(State(state): State<AppState>) -> Result<Json<WorkerStatus>, HttpError> {
    Ok(Json(state.worker.status().await?))
}

/// Activation trigger for workers started without `skip_waiting`.
async fn activate(State(state): State<AppState>) -> Result<impl IntoResponse, HttpError> {
    let report = state.worker.activate().await?;
    Ok(Json(json!({
        "state": state.worker.state(),
        "deleted": report.deleted,
        "failed": report.failed,
    })))
}

async fn proxy(State(state): State<AppState>, request: HttpRequest<Body>) -> Result<HttpResponse, HttpError> {
    let (parts, body) = request.into_parts();

    let url = target_url(&parts.uri, &state.origin)?;
    let body = body::to_bytes(body, state.body_limit)
        .await
        .map_err(|_| HttpError::BodyTooLarge(state.body_limit))?;

    let destination = Destination::infer(&parts.method, &parts.headers);
    let request = Request::new(parts.method, url)
        .with_headers(parts.headers)
        .with_body(body)
        .with_destination(destination);

    tracing::debug!(method = %request.method, url = %request.url, destination = ?request.destination, "intercepted");
    let response = state.worker.fetch(request).await;
    Ok(into_http(response))
}

fn target_url(uri: &Uri, origin: &Url) -> Result<Url, HttpError> {
    if uri.scheme().is_some() {
        return Ok(canonicalize(&uri.to_string(), origin)?);
    }

    // origin-form targets always stay on the origin, whatever the query holds
    let target = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    Ok(canonicalize(&format!("{}{target}", origin.origin().ascii_serialization()), origin)?)
}

fn into_http(response: Response) -> HttpResponse {
    let mut out = HttpResponse::new(Body::from(response.body));
    *out.status_mut() = response.status;
    *out.headers_mut() = response.headers;
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::testing::{FakeNetwork, origin};
    use crate::worker::tests::{manifest, routed_network, settings};
    use seamcache_core::CacheDb;
    use tower::ServiceExt;

    async fn app(network: Arc<FakeNetwork>) -> (Router, Arc<Worker>) {
        let db = CacheDb::open_in_memory().await.unwrap();
        let worker = Arc::new(Worker::new(db, network, manifest(), settings("v1", 1024)));
        worker.start().await.unwrap();
        let state = AppState { worker: worker.clone(), origin: origin(), body_limit: 64 };
        (router(state), worker)
    }

    async fn body_bytes(response: HttpResponse) -> Bytes {
        body::to_bytes(response.into_body(), usize::MAX).await.unwrap()
    }

    fn get_request(uri: &str) -> HttpRequest<Body> {
        HttpRequest::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_proxy_serves_from_cache() {
        let network = routed_network();
        let (app, _) = app(network.clone()).await;
        network.set_offline(true);

        let response = app.oneshot(get_request("/styles.css")).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(&body_bytes(response).await[..], b"body{}");
    }

    #[tokio::test]
    async fn test_proxy_accepts_absolute_form() {
        let network = routed_network();
        network.route("https://cdn.example/lib.js", 200, "lib");
        let (app, _) = app(network.clone()).await;

        let response = app.oneshot(get_request("https://cdn.example/lib.js")).await.unwrap();
        assert_eq!(&body_bytes(response).await[..], b"lib");
        assert_eq!(network.calls_to("https://cdn.example/lib.js"), 1);
    }

    #[tokio::test]
    async fn test_proxy_offline_navigation_gets_offline_page() {
        let network = routed_network();
        let (app, _) = app(network.clone()).await;
        network.set_offline(true);

        let request = HttpRequest::builder()
            .uri("/reports/2024")
            .header(http::header::ACCEPT, "text/html,application/xhtml+xml")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(&body_bytes(response).await[..], b"<html>offline</html>");
    }

    #[tokio::test]
    async fn test_proxy_offline_asset_gets_503() {
        let network = routed_network();
        let (app, _) = app(network.clone()).await;
        network.set_offline(true);

        let response = app.oneshot(get_request("/chart.png")).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(&body_bytes(response).await[..], seamcache_core::model::UNAVAILABLE_BODY.as_bytes());
    }

    #[tokio::test]
    async fn test_proxy_forwards_write_with_url_in_query() {
        let network = routed_network();
        network.route("http://app.test/api/sales?ref=https://x.example/", 201, "created");
        let (app, _) = app(network.clone()).await;

        let request = HttpRequest::builder()
            .method("POST")
            .uri("/api/sales?ref=https://x.example/")
            .body(Body::from("{}"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), http::StatusCode::CREATED);
        assert!(network.calls().contains(&"POST http://app.test/api/sales?ref=https://x.example/".to_string()));
    }

    #[tokio::test]
    async fn test_proxy_rejects_oversized_body() {
        let (app, _) = app(routed_network()).await;

        let request = HttpRequest::builder()
            .method("POST")
            .uri("/api/sales")
            .body(Body::from(vec![b'x'; 65]))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_message_endpoint() {
        let (app, worker) = app(routed_network()).await;

        let request = HttpRequest::builder()
            .method("POST")
            .uri(MESSAGE_PATH)
            .body(Body::from(r#"{"type":"UPDATE_CACHE","data":{"foo":1}}"#))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::ACCEPTED);
        worker.pending().drain().await;

        let response = app.oneshot(get_request("/data.json")).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(value, json!({"foo": 1}));
    }

    #[tokio::test]
    async fn test_message_endpoint_rejects_bad_message() {
        let (app, _) = app(routed_network()).await;

        let request = HttpRequest::builder()
            .method("POST")
            .uri(MESSAGE_PATH)
            .body(Body::from(r#"{"type":"UPDATE_CACHE","data":null}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_activate_endpoint_activates_waiting_worker() {
        let network = routed_network();
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open_instance("app-v0").await.unwrap();
        let mut waiting = settings("v1", 1024);
        waiting.skip_waiting = false;
        let worker = Arc::new(Worker::new(db, network.clone(), manifest(), waiting));
        worker.start().await.unwrap();
        let app = router(AppState { worker: worker.clone(), origin: origin(), body_limit: 64 });

        let response = app.clone().oneshot(get_request(STATUS_PATH)).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(value["state"], "installed");
        assert_eq!(value["serving"], serde_json::Value::Null);

        let request = HttpRequest::builder().method("POST").uri(ACTIVATE_PATH).body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);
        let value: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(value["state"], "activated");
        assert_eq!(value["deleted"], json!(["app-v0"]));

        network.set_offline(true);
        let response = app.oneshot(get_request("/styles.css")).await.unwrap();
        assert_eq!(&body_bytes(response).await[..], b"body{}");
    }

    #[tokio::test]
    async fn test_activate_endpoint_rejects_uninstalled_worker() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let worker = Arc::new(Worker::new(db, routed_network(), manifest(), settings("v1", 1024)));
        let app = router(AppState { worker, origin: origin(), body_limit: 64 });

        let request = HttpRequest::builder().method("POST").uri(ACTIVATE_PATH).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let (app, _) = app(routed_network()).await;

        let response = app.oneshot(get_request(STATUS_PATH)).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);

        let value: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(value["state"], "activated");
        assert_eq!(value["serving"], "app-v1");
        assert_eq!(value["entries"], 3);
    }
}
