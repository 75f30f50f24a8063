//! `RelayServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::errors::{Result, ServerError};
use crate::health::{self, HealthResponse};
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::connection::ConnectionId;
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::relay::BroadcastRelay;
use crate::websocket::session::run_ws_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast relay for fan-out.
    pub relay: Arc<BroadcastRelay>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus render handle.
    pub metrics: PrometheusHandle,
    /// Max inbound WebSocket message size.
    pub max_message_size: usize,
    /// Per-client outbound queue depth.
    pub send_queue_capacity: usize,
    /// UI entry page served on plain `GET /`.
    pub index_file: PathBuf,
}

/// The broadcast relay server.
pub struct RelayServer {
    config: ServerConfig,
    relay: Arc<BroadcastRelay>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: PrometheusHandle,
}

impl RelayServer {
    /// Create a new server.
    pub fn new(config: ServerConfig, metrics: PrometheusHandle) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let relay = Arc::new(BroadcastRelay::new(
            registry,
            config.welcome_message.clone(),
        ));
        Self {
            config,
            relay,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            relay: self.relay.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            max_message_size: self.config.max_message_size,
            send_queue_capacity: self.config.send_queue_capacity,
            index_file: self.config.index_file(),
        };

        let mut router = Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler));
        if self.config.ws_path != "/" {
            router = router.route(&self.config.ws_path, get(ws_handler));
        }
        router
            .fallback_service(ServeDir::new(&self.config.static_dir))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind the listener and serve in a background task.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task,
    /// which finishes once the shutdown token is cancelled.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>)> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local = listener.local_addr().map_err(ServerError::LocalAddr)?;

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(source) = served {
                let err = ServerError::Serve { addr: local, source };
                error!(error = %err, "server stopped");
            }
        });

        info!(%local, "relay server listening");
        Ok((local, handle))
    }

    /// Get the broadcast relay.
    pub fn relay(&self) -> &Arc<BroadcastRelay> {
        &self.relay
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.relay.registry()
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET {ws_path}
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    upgrade(ws, &state)
}

/// GET /: WebSocket upgrade when requested, otherwise the UI entry page.
async fn root_handler(State(state): State<AppState>, req: Request) -> Response {
    if wants_websocket(req.headers()) {
        let (mut parts, _body) = req.into_parts();
        return match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
            Ok(ws) => upgrade(ws, &state),
            Err(rejection) => rejection.into_response(),
        };
    }
    match ServeFile::new(&state.index_file).oneshot(req).await {
        Ok(resp) => resp.into_response(),
        Err(never) => match never {},
    }
}

fn wants_websocket(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// Accept the upgrade and run a tracked session on the socket.
fn upgrade(ws: WebSocketUpgrade, state: &AppState) -> Response {
    let relay = state.relay.clone();
    let capacity = state.send_queue_capacity;
    let shutdown = state.shutdown.clone();

    ws.max_message_size(state.max_message_size)
        .max_frame_size(state.max_message_size)
        .on_failed_upgrade(|e| warn!(error = %e, "websocket upgrade failed"))
        .on_upgrade(move |socket| {
            let session =
                run_ws_session(socket, ConnectionId::new(), relay, capacity, shutdown.token());
            shutdown.track_session(session)
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.relay.registry().len();
    Json(health::health_check(state.start_time, connections))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    metrics::render(&state.metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn make_server() -> RelayServer {
        RelayServer::new(ServerConfig::default(), metrics::detached_handle())
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_string(resp: Response) -> String {
        let body = axum::body::to_bytes(resp.into_body(), 100_000)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[test]
    fn accessors() {
        let server = make_server();
        assert_eq!(server.config().port, 0);
        assert!(server.registry().is_empty());
        assert!(!server.shutdown().is_shutting_down());
        assert!(Arc::ptr_eq(server.registry(), server.relay().registry()));
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = make_server().router();
        let resp = app.oneshot(get_req("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let parsed: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
    }

    #[tokio::test]
    async fn metrics_endpoint_responds() {
        let app = make_server().router();
        let resp = app.oneshot(get_req("/metrics")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ws_endpoint_rejects_plain_get() {
        let config = ServerConfig {
            ws_path: "/ws".into(),
            ..ServerConfig::default()
        };
        let app = RelayServer::new(config, metrics::detached_handle()).router();
        let resp = app.oneshot(get_req("/ws")).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[test]
    fn upgrade_header_detection() {
        let mut headers = HeaderMap::new();
        assert!(!wants_websocket(&headers));
        let _ = headers.insert(header::UPGRADE, "WebSocket".parse().unwrap());
        assert!(wants_websocket(&headers));
        let _ = headers.insert(header::UPGRADE, "h2c".parse().unwrap());
        assert!(!wants_websocket(&headers));
    }

    #[tokio::test]
    async fn root_routes_upgrade_requests_away_from_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dist")).unwrap();
        std::fs::write(dir.path().join("dist/index.html"), "<h1>relay</h1>").unwrap();
        let config = ServerConfig {
            static_dir: dir.path().to_path_buf(),
            ..ServerConfig::default()
        };
        let app = RelayServer::new(config, metrics::detached_handle()).router();

        // No hyper upgrade handle under oneshot, so the upgrade is refused,
        // but it must not fall through to the index page.
        let req = Request::builder()
            .uri("/")
            .header(header::CONNECTION, "upgrade")
            .header(header::UPGRADE, "websocket")
            .header(header::SEC_WEBSOCKET_VERSION, "13")
            .header(header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            static_dir: dir.path().to_path_buf(),
            ..ServerConfig::default()
        };
        let app = RelayServer::new(config, metrics::detached_handle()).router();
        let resp = app.oneshot(get_req("/nonexistent")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_index_returns_404() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            static_dir: dir.path().to_path_buf(),
            ..ServerConfig::default()
        };
        let app = RelayServer::new(config, metrics::detached_handle()).router();
        let resp = app.oneshot(get_req("/")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn serves_index_and_static_assets() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dist")).unwrap();
        std::fs::write(dir.path().join("dist/index.html"), "<h1>relay</h1>").unwrap();
        std::fs::write(dir.path().join("dist/app.js"), "connect();").unwrap();
        let config = ServerConfig {
            static_dir: dir.path().to_path_buf(),
            ..ServerConfig::default()
        };
        let server = RelayServer::new(config, metrics::detached_handle());

        let resp = server.router().oneshot(get_req("/")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "<h1>relay</h1>");

        let resp = server.router().oneshot(get_req("/dist/app.js")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "connect();");
    }

    #[tokio::test]
    async fn custom_ws_path_is_routed() {
        let config = ServerConfig {
            ws_path: "/chat".into(),
            ..ServerConfig::default()
        };
        let app = RelayServer::new(config, metrics::detached_handle()).router();
        let resp = app.oneshot(get_req("/chat")).await.unwrap();
        assert_ne!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port_and_stops_on_shutdown() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);

        server.shutdown().shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let first = make_server();
        let (addr, _handle) = first.listen().await.unwrap();

        let config = ServerConfig {
            port: addr.port(),
            ..ServerConfig::default()
        };
        let second = RelayServer::new(config, metrics::detached_handle());
        let err = second.listen().await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
        first.shutdown().shutdown();
    }
}
