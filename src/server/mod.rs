// SPDX-License-Identifier: MIT

//! HTTP surface for the flow editor
//!
//! Every endpoint takes a flow document (`{nodes, experiments?, unit_config?}`).
//! Validation and layout answer with JSON, export with the bundle archive.
//! Nothing is stored between requests.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::bundle;
use crate::config::EngineConfig;
use crate::flow::layout::layout;
use crate::flow::loader::FlowDocument;
use crate::flow::validator::validate;

type ApiError = (StatusCode, Json<Value>);
type ApiResult = Result<Json<Value>, ApiError>;

const BUNDLE_ARCHIVE_NAME: &str = "flow_bundle.zip";

pub fn router(config: EngineConfig) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/flow/validate", post(validate_flow))
        .route("/api/flow/layout", post(layout_flow))
        .route("/api/flow/export", post(export_flow))
        .with_state(Arc::new(config))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn serve(
    port: u16,
    config: EngineConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(config);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn bad_request(error: impl std::fmt::Display) -> ApiError {
    log::warn!("Rejected flow request: {}", error);
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": error.to_string() })),
    )
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn validate_flow(Json(doc): Json<FlowDocument>) -> ApiResult {
    let (graph, _) = doc.build().map_err(bad_request)?;
    let report = validate(&graph);
    Ok(Json(json!(report)))
}

async fn layout_flow(
    State(config): State<Arc<EngineConfig>>,
    Json(doc): Json<FlowDocument>,
) -> ApiResult {
    let (graph, _) = doc.build().map_err(bad_request)?;
    let positions = layout(&graph, &config.layout);
    Ok(Json(json!({ "positions": positions })))
}

async fn export_flow(
    State(config): State<Arc<EngineConfig>>,
    Json(doc): Json<FlowDocument>,
) -> Result<impl IntoResponse, ApiError> {
    let (graph, bindings) = doc.build().map_err(bad_request)?;
    let archive = bundle::export(&graph, &bindings, &doc.unit_config, &config.export_options())
        .and_then(|bundle| bundle.to_zip())
        .map_err(bad_request)?;

    let disposition = format!("attachment; filename=\"{}\"", BUNDLE_ARCHIVE_NAME);
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        archive,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::Bundle;
    use axum::body::{Body, Bytes};
    use axum::http::{HeaderMap, Request};
    use tower::ServiceExt;

    const FLOW: &str = r#"{
        "nodes": [
            {"name": "Boot", "type": "Start"},
            {"name": "T1", "type": "Test", "experiment": "exp_t1",
             "onPass": "End_PASS", "onFail": "End_FAIL"},
            {"name": "End_PASS", "type": "EndPass"},
            {"name": "End_FAIL", "type": "EndFail"}
        ],
        "experiments": {"T1": [{"Test Name": "T1"}]},
        "unit_config": {"com_port": 11}
    }"#;

    async fn post_raw(uri: &str, body: &str) -> (StatusCode, HeaderMap, Bytes) {
        let response = router(EngineConfig::default())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, bytes)
    }

    async fn post_json(uri: &str, body: &str) -> (StatusCode, Value) {
        let (status, _, bytes) = post_raw(uri, body).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let response = router(EngineConfig::default())
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_validate_endpoint() {
        let (status, body) = post_json("/api/flow/validate", FLOW).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"valid": true, "errors": [], "warnings": []}));
    }

    #[tokio::test]
    async fn test_layout_endpoint() {
        let (status, body) = post_json("/api/flow/layout", FLOW).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["positions"]["node_000"], json!({"x": 160, "y": 160}));
        assert_eq!(body["positions"]["node_001"], json!({"x": 400, "y": 160}));
    }

    #[tokio::test]
    async fn test_export_endpoint() {
        let (status, headers, bytes) = post_raw("/api/flow/export", FLOW).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "application/zip");
        assert!(headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains(BUNDLE_ARCHIVE_NAME));

        let bundle = Bundle::from_zip(&bytes).unwrap();
        assert_eq!(bundle.structure["connections"].as_array().unwrap().len(), 3);
        assert_eq!(bundle.flows["node_001"]["node"], json!("T1"));
        assert!(bundle.ini.starts_with("[Connection]\nCOMPort = 11"));
    }

    #[tokio::test]
    async fn test_build_error_is_bad_request() {
        let flow = r#"{"nodes": [{"name": "A", "type": "Start", "onPass": "Missing"}]}"#;
        let (status, body) = post_json("/api/flow/validate", flow).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Missing"));
    }
}
