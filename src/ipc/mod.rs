//! IPC HTTP server — local control plane for the UI shell.
//!
//! The Rust analog of the renderer-facing IPC handlers: the UI drives the
//! supervisor's control surface (start/stop/restart/status) and queries
//! backend data through this loopback server; it never touches the
//! backend process itself. Control operations answer with plain success
//! booleans — a failed start is a degraded state, not an HTTP error.

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::client::BackendClient;
use crate::supervisor::BackendSupervisor;

/// IPC 응답 타입
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendStatusResponse {
    pub running: bool,
    pub state: String,
    pub pid: Option<u32>,
    pub url: String,
    pub mode: String,
    pub error: Option<String>,
    pub error_code: Option<String>,
}

/// IPC Server State
#[derive(Clone)]
pub struct IPCServer {
    pub supervisor: Arc<BackendSupervisor>,
    pub client: BackendClient,
    pub listen_addr: String,
}

impl IPCServer {
    pub fn new(supervisor: Arc<BackendSupervisor>, listen_addr: &str) -> Self {
        let client = BackendClient::new(supervisor.server_url());
        Self {
            supervisor,
            client,
            listen_addr: listen_addr.to_string(),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(root))
            .route("/api/backend/status", get(backend_status))
            .route("/api/backend/start", post(start_backend))
            .route("/api/backend/stop", post(stop_backend))
            .route("/api/backend/restart", post(restart_backend))
            .route("/api/backend/endpoints", get(list_endpoints))
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    /// Serve until the shutdown token fires.
    pub async fn start(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        tracing::info!("IPC HTTP server starting on {}", self.listen_addr);

        let listener = tokio::net::TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("IPC listening on http://{}", self.listen_addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;
        Ok(())
    }
}

/// GET / - 데몬 자체 liveness
async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "minerva-core",
        "message": "Minerva core daemon",
    }))
}

/// GET /api/backend/status - 백엔드 상태 조회
async fn backend_status(State(state): State<IPCServer>) -> impl IntoResponse {
    let supervisor = &state.supervisor;
    let (error, error_code) = match supervisor.last_error() {
        Some((message, code)) => (Some(message), Some(code.to_string())),
        None => (None, None),
    };

    Json(BackendStatusResponse {
        running: supervisor.is_running(),
        state: format!("{:?}", supervisor.state()).to_lowercase(),
        pid: supervisor.pid(),
        url: supervisor.server_url(),
        mode: supervisor.mode_label().to_string(),
        error,
        error_code,
    })
}

/// POST /api/backend/start
async fn start_backend(State(state): State<IPCServer>) -> impl IntoResponse {
    let success = state.supervisor.start().await;
    Json(ControlResponse { success })
}

/// POST /api/backend/stop - stop은 항상 수렴하므로 항상 success
async fn stop_backend(State(state): State<IPCServer>) -> impl IntoResponse {
    state.supervisor.stop().await;
    Json(ControlResponse { success: true })
}

/// POST /api/backend/restart
async fn restart_backend(State(state): State<IPCServer>) -> impl IntoResponse {
    let success = state.supervisor.restart().await;
    Json(ControlResponse { success })
}

/// GET /api/backend/endpoints - 백엔드 endpoint 목록 프록시.
/// 백엔드가 죽어 있으면 {error, status} 형태로 열화되어 전달된다.
async fn list_endpoints(State(state): State<IPCServer>) -> impl IntoResponse {
    Json(state.client.get_endpoints().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendCommand, SupervisorConfig};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::path::PathBuf;
    use std::time::Duration;
    use tower::util::ServiceExt;

    fn test_server() -> IPCServer {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = SupervisorConfig {
            bind_host: "127.0.0.1".to_string(),
            port,
            command: BackendCommand::Packaged {
                executable: PathBuf::from("/nonexistent/backend/minerva-backend"),
            },
            ready_max_attempts: 2,
            ready_interval: Duration::from_millis(10),
            ready_attempt_timeout: Duration::from_millis(100),
            shutdown_grace: Duration::from_millis(500),
            restart_settle: Duration::from_millis(10),
        };
        IPCServer::new(Arc::new(BackendSupervisor::new(config)), "127.0.0.1:0")
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn status_reports_idle_backend() {
        let server = test_server();
        let url = server.supervisor.server_url();

        let resp = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/api/backend/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["running"], false);
        assert_eq!(body["state"], "idle");
        assert_eq!(body["url"], url);
        assert_eq!(body["mode"], "production");
        assert_eq!(body["pid"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn stop_is_always_success() {
        let server = test_server();

        let resp = server
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/backend/stop")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
        // stop은 no-op였고 상태는 그대로 idle
        assert!(!server.supervisor.is_running());
    }

    #[tokio::test]
    async fn failed_start_surfaces_error_code_in_status() {
        let server = test_server();

        let resp = server
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/backend/start")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(resp).await;
        assert_eq!(body["success"], false);

        let resp = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/api/backend/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(resp).await;
        assert_eq!(body["running"], false);
        assert_eq!(body["state"], "failed");
        assert_eq!(body["error_code"], "EXECUTABLE_NOT_FOUND");
    }

    #[tokio::test]
    async fn endpoints_proxy_degrades_when_backend_is_down() {
        let server = test_server();

        let resp = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/api/backend/endpoints")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        // 백엔드 부재 → {error, status: 0} 형태로 열화
        assert_eq!(body["status"], 0);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn root_answers() {
        let server = test_server();
        let resp = server
            .router()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["name"], "minerva-core");
    }
}
