//! Gateway module - HTTP front door for the sandbox engine
//!
//! ```text
//! POST /api/execute   { code, language }  -> ExecutionResult
//! GET  /api/health                        -> HealthReport
//! ```
//!
//! A counting semaphore bounds how many executions are in flight at once;
//! further requests wait for a permit. An admitted execution runs on its own
//! task and keeps its permit until it finishes, even if the client disconnects.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::error::{Error, ErrorKind};
use crate::sandbox::{ExecutionRequest, HealthReport, LanguageKind, SandboxEngine};

/// Message returned when the daemon cannot be reached
pub const DAEMON_UNAVAILABLE_MESSAGE: &str =
    "Docker is not available. Please ensure Docker is running.";

// ---- App State ----

#[derive(Clone)]
pub struct GatewayState {
    engine: Arc<SandboxEngine>,
    permits: Arc<Semaphore>,
}

impl GatewayState {
    pub fn new(engine: Arc<SandboxEngine>, max_concurrent: usize) -> Self {
        GatewayState {
            engine,
            permits: Arc::new(Semaphore::new(max_concurrent)),
        }
    }
}

// ---- Error Handling ----

struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        AppError {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn unavailable() -> Self {
        AppError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: DAEMON_UNAVAILABLE_MESSAGE.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        AppError {
            status,
            message: err.to_string(),
        }
    }
}

// ---- Request Types ----

#[derive(Debug, Deserialize)]
struct ExecuteBody {
    code: Option<String>,
    #[serde(alias = "template")]
    language: Option<String>,
}

// ---- Handlers ----

async fn execute(
    State(state): State<GatewayState>,
    Json(body): Json<ExecuteBody>,
) -> Result<Response, AppError> {
    let (Some(code), Some(language)) = (body.code, body.language) else {
        return Err(AppError::bad_request("Missing code or language"));
    };
    let language: LanguageKind = language.parse()?;

    let permit = state
        .permits
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| Error::Internal("admission limiter closed".to_string()))?;
    debug!(%language, "Admitted execution request");

    // Runs to completion even if the client goes away; the permit is held until then.
    let engine = state.engine.clone();
    let result = tokio::spawn(async move {
        let _permit = permit;
        engine.execute(ExecutionRequest::new(code, language)).await
    })
    .await
    .map_err(|e| Error::Internal(format!("execution task failed: {}", e)))?;

    if result.error_kind == Some(ErrorKind::DaemonUnavailable) {
        return Err(AppError::unavailable());
    }

    Ok(Json(result).into_response())
}

async fn health(State(state): State<GatewayState>) -> Json<HealthReport> {
    Json(state.engine.health().report().await)
}

// ---- Router ----

pub fn build_router(state: GatewayState) -> Router {
    let api = Router::new()
        .route("/execute", post(execute))
        .route("/health", get(health));

    Router::new()
        .nest("/api", api)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serve the gateway until the listener fails
pub async fn serve(listener: tokio::net::TcpListener, state: GatewayState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Gateway listening on http://{}", addr);
    }
    axum::serve(listener, build_router(state)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::engine_tests::{engine_with, framed};
    use crate::sandbox::FakeRuntime;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    fn router_for(runtime: FakeRuntime) -> (Router, tempfile::TempDir) {
        let (engine, scratch) = engine_with(Arc::new(runtime));
        let state = GatewayState::new(Arc::new(engine), 2);
        (build_router(state), scratch)
    }

    async fn post_json(router: Router, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/execute")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_execute_returns_result() {
        let runtime = FakeRuntime {
            logs: framed("42\n", ""),
            ..FakeRuntime::new().with_image("python:3.11-slim")
        };
        let (router, _scratch) = router_for(runtime);

        let (status, body) = post_json(
            router,
            serde_json::json!({ "code": "print(42)", "language": "python" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["output"], "42\n");
        assert_eq!(body["error"], Value::Null);
        assert!(body["executionTime"].is_u64());
    }

    #[tokio::test]
    async fn test_template_alias() {
        let (router, _scratch) = router_for(FakeRuntime::new().with_image("node:20-slim"));
        let (status, body) = post_json(
            router,
            serde_json::json!({ "code": "console.log(1)", "template": "node" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_missing_fields_is_bad_request() {
        let (router, _scratch) = router_for(FakeRuntime::new());
        let (status, body) = post_json(router, serde_json::json!({ "code": "print(1)" })).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing code or language");
    }

    #[tokio::test]
    async fn test_unknown_language_is_bad_request() {
        let (router, _scratch) = router_for(FakeRuntime::new());
        let (status, body) = post_json(
            router,
            serde_json::json!({ "code": "puts 1", "language": "ruby" }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Unsupported language"));
    }

    #[tokio::test]
    async fn test_daemon_down_is_service_unavailable() {
        let (router, scratch) = router_for(FakeRuntime {
            daemon_down: true,
            ..FakeRuntime::new()
        });
        let (status, body) = post_json(
            router,
            serde_json::json!({ "code": "print(1)", "language": "python" }),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], DAEMON_UNAVAILABLE_MESSAGE);
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_keeps_permit_until_cleanup() {
        let runtime = Arc::new(FakeRuntime {
            hang: true,
            ..FakeRuntime::new().with_image("python:3.11-slim")
        });
        let (engine, scratch) = engine_with(runtime.clone());
        let state = GatewayState::new(Arc::new(engine), 1);
        let router = build_router(state.clone());

        let request = Request::builder()
            .method("POST")
            .uri("/api/execute")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::json!({ "code": "while True: pass", "language": "python" })
                    .to_string(),
            ))
            .unwrap();
        let dropped =
            tokio::time::timeout(Duration::from_millis(20), router.oneshot(request)).await;
        assert!(dropped.is_err());
        assert_eq!(state.permits.available_permits(), 0);

        for _ in 0..200 {
            if state.permits.available_permits() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(state.permits.available_permits(), 1);
        assert!(runtime.called("kill"));
        assert!(runtime.called("remove"));
        assert_eq!(runtime.running_containers(), 0);
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_health_report() {
        let (router, _scratch) = router_for(FakeRuntime::new());
        let request = Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let report: HealthReport = serde_json::from_slice(&bytes).unwrap();
        assert!(report.docker);
        assert!(report.info.starts_with("Docker is running"));
    }
}
