//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the axum Router with the catch-all gateway handler
//! - Wire up middleware (tracing, timeout, request ID)
//! - Collect request bodies and hand requests to the request driver
//! - Serve with graceful shutdown

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::GatewayConfig;
use crate::driver::{InboundRequest, RequestDriver};
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::http::response::StreamingResponseWriter;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub driver: Arc<RequestDriver>,
    pub max_body_size: usize,
}

/// Front-end HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
}

impl GatewayServer {
    pub fn new(driver: Arc<RequestDriver>, config: &GatewayConfig) -> Self {
        let state = AppState {
            driver,
            max_body_size: config.security.max_body_size,
        };
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http())
                    .layer(propagate_request_id_layer())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs))),
            )
    }

    /// The router, for serving on a custom listener or in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` resolves, then drain in-flight requests.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all handler: every request goes through the driver.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let request_id = request_id(request.headers());
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(
                request_id = %request_id,
                max_body_size = state.max_body_size,
                error = %e,
                "Rejecting request body"
            );
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    tracing::debug!(
        request_id = %request_id,
        method = %parts.method,
        uri = %parts.uri,
        body_len = body.len(),
        "Accepted request"
    );

    let mut inbound = InboundRequest::new(request_id, parts.method, parts.uri);
    inbound.headers = parts.headers;
    inbound.body = body;

    let (writer, pending) = StreamingResponseWriter::new();
    state.driver.spawn(inbound, writer);
    pending.into_response().await
}
