//! HTTP surface: the public MJPEG stream listener and the loopback control
//! listener consumed by the control-surface collaborator.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::recording::{StartRecording, StopRecording};
use crate::service::CameraService;

/// Public router: the never-ending multipart stream plus the fps readout
/// the browser GUI overlays on it.
pub fn stream_router(service: Arc<CameraService>) -> Router {
    Router::new()
        .route("/", get(stream))
        .route("/fps", get(fps))
        .with_state(service)
}

/// Loopback router: the command surface. Permissive CORS so the browser GUI
/// served by the control-surface collaborator can call it directly.
pub fn control_router(service: Arc<CameraService>) -> Router {
    Router::new()
        .route("/snapshot", get(snapshot))
        .route("/record/start", get(record_start))
        .route("/record/stop", get(record_stop))
        .route("/fps", get(fps))
        .route("/status", get(status))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Serve on an already bound listener until the shutdown token fires.
/// Binding happens at startup so a taken port fails fast.
pub async fn serve(
    app: Router,
    listener: tokio::net::TcpListener,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("listening on http://{addr}");
    }
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.cancelled_owned())
    .await
}

/// `GET /` — attach as a viewer. The response never ends from our side
/// except on shutdown; each part is one JPEG frame.
async fn stream(
    State(service): State<Arc<CameraService>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
) -> Response {
    let viewer = service.hub.attach(remote);
    let body = Body::from_stream(viewer.into_body_stream(service.shutdown.clone()));
    (
        [
            (header::CONTENT_TYPE, service.hub.content_type()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        body,
    )
        .into_response()
}

/// `GET /fps`
async fn fps(State(service): State<Arc<CameraService>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "fps": service.fps.current() }))
}

/// `GET /status`
async fn status(State(service): State<Arc<CameraService>>) -> Response {
    Json(service.status().await).into_response()
}

/// `GET /snapshot`
async fn snapshot(State(service): State<Arc<CameraService>>) -> Response {
    match service.snapshots.capture().await {
        Ok(path) => Json(serde_json::json!({ "saved": path.display().to_string() }))
            .into_response(),
        Err(e @ crate::error::SnapshotError::NoFrame) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// `GET /record/start`
async fn record_start(State(service): State<Arc<CameraService>>) -> Response {
    match service.recorder.start().await {
        Ok(StartRecording::Started { path }) => Json(serde_json::json!({
            "recording": true,
            "started": true,
            "path": path.display().to_string(),
        }))
        .into_response(),
        Ok(StartRecording::AlreadyRecording) => Json(serde_json::json!({
            "recording": true,
            "started": false,
        }))
        .into_response(),
        Ok(StartRecording::InsufficientSpace {
            available,
            required,
        }) => (
            StatusCode::INSUFFICIENT_STORAGE,
            Json(serde_json::json!({
                "error": "insufficient disk space",
                "available_bytes": available,
                "required_bytes": required,
            })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// `GET /record/stop`
async fn record_stop(State(service): State<Arc<CameraService>>) -> Response {
    match service.recorder.stop().await {
        StopRecording::Stopped { raw, output } => Json(serde_json::json!({
            "recording": false,
            "stopped": true,
            "raw": raw.display().to_string(),
            "output": output.display().to_string(),
        }))
        .into_response(),
        StopRecording::NotRecording => Json(serde_json::json!({
            "recording": false,
            "stopped": false,
        }))
        .into_response(),
    }
}
