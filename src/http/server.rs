//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the direct-post endpoint and `/health`
//! - Wire up middleware (tracing, limits, timeouts, request ID)
//! - Bind server to listener, plain or TLS
//! - Graceful shutdown: drain requests, then close the worker

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, RawQuery, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::bridge::BridgeState;
use crate::config::BridgeConfig;
use crate::http::direct_post::DirectPostHandler;
use crate::http::request::{request_id, UuidRequestId};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

// Upper bound on draining in-flight TLS requests after shutdown.
const TLS_DRAIN_SECS: u64 = 30;

/// HTTP server for the payment bridge.
pub struct HttpServer {
    router: Router,
    config: BridgeConfig,
    handler: Arc<DirectPostHandler>,
}

impl HttpServer {
    /// Create a new HTTP server around an assembled handler.
    pub fn new(config: BridgeConfig, handler: Arc<DirectPostHandler>) -> Self {
        let router = Self::build_router(&config, handler.clone());
        Self { router, config, handler }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &BridgeConfig, handler: Arc<DirectPostHandler>) -> Router {
        let max_body = config.direct_post.max_body_size;
        direct_post_router(handler.clone())
            .merge(Router::new().route("/health", get(health_handler)).with_state(handler))
            .layer(DefaultBodyLimit::max(max_body))
            .layer(RequestBodyLimitLayer::new(max_body))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
    }

    /// The fully layered router, for embedding or in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` fires, then close the worker.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            endpoint = %self.config.direct_post.endpoint,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        tracing::info!("HTTP server stopped");
        close_bridge(&self.handler).await;
        Ok(())
    }

    /// Serve TLS on `addr` until `shutdown` fires, then close the worker.
    pub async fn run_tls(self, addr: SocketAddr, tls: RustlsConfig, shutdown: Shutdown) -> Result<(), std::io::Error> {
        tracing::info!(
            address = %addr,
            endpoint = %self.config.direct_post.endpoint,
            "HTTPS server starting"
        );

        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        let signal = shutdown.wait();
        tokio::spawn(async move {
            signal.await;
            drain.graceful_shutdown(Some(Duration::from_secs(TLS_DRAIN_SECS)));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service())
            .await?;

        tracing::info!("HTTPS server stopped");
        close_bridge(&self.handler).await;
        Ok(())
    }
}

/// Just the direct-post endpoint, for merging into a host application's
/// router. Requests to other paths never reach the handler.
pub fn direct_post_router(handler: Arc<DirectPostHandler>) -> Router {
    let endpoint = handler.config().endpoint.clone();
    Router::new()
        .route(&endpoint, any(direct_post_handler))
        .with_state(handler)
}

async fn direct_post_handler(
    State(handler): State<Arc<DirectPostHandler>>,
    method: Method,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    let start = Instant::now();
    let reply = handler.handle(&method, query.as_deref(), &body).await;
    let status = reply.status();

    metrics::record_direct_post(method.as_str(), status.as_u16());
    tracing::info!(
        request_id = %request_id(&headers),
        method = %method,
        status = status.as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Direct post handled"
    );

    reply.into_response()
}

async fn health_handler(State(handler): State<Arc<DirectPostHandler>>) -> impl IntoResponse {
    let bridge = handler.bridge();
    let state = match bridge.state() {
        BridgeState::Running => "running",
        BridgeState::Faulted => "faulted",
        BridgeState::Closed => "closed",
    };
    let (status, label) = if bridge.is_usable() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };
    (
        status,
        Json(json!({
            "status": label,
            "bridge": state,
            "exchanges": bridge.exchanges(),
        })),
    )
}

async fn close_bridge(handler: &DirectPostHandler) {
    if let Err(e) = handler.bridge().shutdown().await {
        tracing::warn!(error = %e, "Worker did not shut down cleanly");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::bridge::GatewayConfig;
    use crate::codec::PlainCodec;
    use crate::config::WorkerConfig;
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    fn server() -> HttpServer {
        let mut config = BridgeConfig::default();
        config.worker = WorkerConfig {
            command: "cat".into(),
            ..WorkerConfig::default()
        };
        config.gateways = vec![GatewayConfig::new("bogus", "test")];
        let handler = DirectPostHandler::from_source(
            Arc::new(PlainCodec),
            &config,
            &config.worker,
            config.direct_post.clone(),
        )
        .unwrap();
        HttpServer::new(config, Arc::new(handler))
    }

    #[tokio::test]
    async fn test_health_reports_bridge_state() {
        let server = server();
        let res = server
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key("x-request-id"));

        let body = axum::body::to_bytes(res.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["bridge"], "running");
        assert_eq!(json["exchanges"], 0);
    }

    #[tokio::test]
    async fn test_unsupported_method_on_endpoint() {
        let server = server();
        let res = server
            .router()
            .oneshot(
                Request::delete("/direct-post/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.headers()[header::ALLOW], "GET, POST");
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let server = server();
        let body = vec![b'a'; server.config().direct_post.max_body_size + 1];
        let res = server
            .router()
            .oneshot(Request::post("/direct-post/").body(Body::from(body)).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
