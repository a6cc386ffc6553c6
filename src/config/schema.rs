//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Route definitions mapping requests to destinations.
    pub routes: Vec<RouteConfig>,

    /// Per-destination client pool settings.
    pub pool: PoolConfig,

    /// Response buffering.
    pub buffers: BufferConfig,

    /// Cross-loop worker limits.
    pub bridge: BridgeConfig,

    /// Readiness polling while backend scopes start up.
    pub backend_init: BackendInitConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Route configuration mapping requests to a destination.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging; also names the route's backend scope.
    pub name: String,

    /// Host header to match (exact match).
    pub host: Option<String>,

    /// Path prefix to match.
    pub path_prefix: Option<String>,

    /// Destination URL (e.g., "http://svc-a:8080").
    pub target: String,

    /// Credentials file that must exist before the scope is ready.
    pub identity_path: Option<String>,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,
}

/// Client pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Clients per destination (minimum 5).
    pub capacity: usize,

    /// Maximum number of distinct destinations.
    pub max_destinations: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            max_destinations: 25,
        }
    }
}

/// Response buffer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Largest single output buffer, in bytes.
    pub chunk_size: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { chunk_size: 4096 }
    }
}

/// Cross-loop bridge configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Jobs allowed in flight before submissions are rejected.
    pub max_pending: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self { max_pending: 1024 }
    }
}

/// Backoff for re-checking a backend scope that is still starting.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendInitConfig {
    pub poll_base_ms: u64,
    pub poll_max_ms: u64,
}

impl Default for BackendInitConfig {
    fn default() -> Self {
        Self {
            poll_base_ms: 100,
            poll_max_ms: 2000,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}
