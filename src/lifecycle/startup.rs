//! Startup orchestration.
//!
//! # Responsibilities
//! - Compile routes and start the back loop with every route's scope
//! - Build the transport, pool registry, bridge and request driver
//! - Tear everything down in reverse order on shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The listener is bound by the caller, after startup succeeded

use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

use crate::backend::{BackLoop, BackendTransport, HttpTransport};
use crate::bridge::CrossLoopBridge;
use crate::client_pool::PoolRegistry;
use crate::config::GatewayConfig;
use crate::driver::{DriverSettings, RequestDriver};
use crate::http::GatewayServer;
use crate::resilience::backoff::Backoff;
use crate::routing::{RouteError, Router};

/// Errors that abort startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid route table: {0}")]
    Routes(#[from] RouteError),

    #[error("failed to start back loop: {0}")]
    BackLoop(#[from] std::io::Error),
}

/// A running gateway core: back loop, pools, bridge and driver.
pub struct Gateway {
    config: GatewayConfig,
    router: Arc<Router>,
    registry: Arc<PoolRegistry>,
    bridge: Arc<CrossLoopBridge>,
    driver: Arc<RequestDriver>,
    back_loop: BackLoop,
}

impl Gateway {
    /// Start with the HTTP/1.1 backend transport.
    pub fn start(config: GatewayConfig) -> Result<Self, StartupError> {
        let connect_timeout = Duration::from_secs(config.timeouts.connect_secs);
        Self::start_with(config, |back| {
            Arc::new(HttpTransport::new(back, connect_timeout)) as Arc<dyn BackendTransport>
        })
    }

    /// Start with a custom transport, built against the back-loop handle.
    pub fn start_with<F>(config: GatewayConfig, make_transport: F) -> Result<Self, StartupError>
    where
        F: FnOnce(Handle) -> Arc<dyn BackendTransport>,
    {
        let router = Arc::new(Router::from_config(&config.routes)?);
        tracing::info!(routes = router.len(), "Routes compiled");

        let back_loop = BackLoop::start(router.scopes(), config.bridge.max_pending)?;
        let back = back_loop.handle().clone();

        let transport = make_transport(back.clone());
        let registry = Arc::new(PoolRegistry::new(transport, config.pool.max_destinations));
        let bridge = Arc::new(CrossLoopBridge::new(back, config.bridge.max_pending));

        let settings = DriverSettings {
            pool_capacity: config.pool.capacity,
            chunk_size: config.buffers.chunk_size,
            init_poll: Backoff::new(
                Duration::from_millis(config.backend_init.poll_base_ms),
                Duration::from_millis(config.backend_init.poll_max_ms),
            ),
        };
        let driver = Arc::new(RequestDriver::new(router.clone(), registry.clone(), bridge.clone(), settings));

        tracing::info!(
            pool_capacity = config.pool.capacity,
            max_destinations = config.pool.max_destinations,
            chunk_size = config.buffers.chunk_size,
            max_pending = config.bridge.max_pending,
            "Gateway core started"
        );

        Ok(Self {
            config,
            router,
            registry,
            bridge,
            driver,
            back_loop,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }

    pub fn driver(&self) -> &Arc<RequestDriver> {
        &self.driver
    }

    pub fn back_handle(&self) -> &Handle {
        self.back_loop.handle()
    }

    /// Front-end server wired to this gateway's driver.
    pub fn server(&self) -> GatewayServer {
        GatewayServer::new(self.driver.clone(), &self.config)
    }

    /// Refuse new work, fail queued acquisitions, then stop the back loop.
    pub fn shutdown(self) {
        self.bridge.close();
        self.registry.close();
        self.back_loop.shutdown();
        tracing::info!("Gateway core stopped");
    }
}
