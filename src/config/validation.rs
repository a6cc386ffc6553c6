//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (pool capacity, buffer sizes, worker limits)
//! - Check route targets parse and route names are unique
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::client_pool::DestinationKey;
use crate::config::schema::GatewayConfig;

/// Smallest pool capacity accepted.
pub const MIN_POOL_CAPACITY: usize = 5;

/// Largest bridge job limit accepted. Every pending job may hold a
/// back-loop blocking thread while it waits for a client.
pub const MAX_PENDING_LIMIT: usize = 4096;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.pool.capacity < MIN_POOL_CAPACITY {
        errors.push(ValidationError::new(
            "pool.capacity",
            format!("must be at least {} (got {})", MIN_POOL_CAPACITY, config.pool.capacity),
        ));
    }
    if config.pool.max_destinations == 0 {
        errors.push(ValidationError::new("pool.max_destinations", "must be greater than 0"));
    }
    if config.buffers.chunk_size == 0 {
        errors.push(ValidationError::new("buffers.chunk_size", "must be greater than 0"));
    }
    if config.bridge.max_pending == 0 || config.bridge.max_pending > MAX_PENDING_LIMIT {
        errors.push(ValidationError::new(
            "bridge.max_pending",
            format!("must be between 1 and {} (got {})", MAX_PENDING_LIMIT, config.bridge.max_pending),
        ));
    }
    if config.backend_init.poll_base_ms == 0 || config.backend_init.poll_max_ms < config.backend_init.poll_base_ms {
        errors.push(ValidationError::new(
            "backend_init",
            "poll_base_ms must be > 0 and no greater than poll_max_ms",
        ));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.routes.is_empty() {
        errors.push(ValidationError::new("routes", "at least one route is required"));
    }

    let mut names = HashSet::new();
    for (i, route) in config.routes.iter().enumerate() {
        let field = format!("routes[{}]", i);
        if route.name.is_empty() {
            errors.push(ValidationError::new(&field, "name must not be empty"));
        } else if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::new(&field, format!("duplicate route name '{}'", route.name)));
        }
        if let Err(e) = DestinationKey::parse(&route.target) {
            errors.push(ValidationError::new(format!("{}.target", field), e.to_string()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RouteConfig;

    fn route(name: &str, target: &str) -> RouteConfig {
        RouteConfig {
            name: name.to_string(),
            host: None,
            path_prefix: None,
            target: target.to_string(),
            identity_path: None,
            priority: 0,
        }
    }

    fn valid() -> GatewayConfig {
        GatewayConfig {
            routes: vec![route("svc-a", "http://svc-a:8080")],
            ..Default::default()
        }
    }

    #[test]
    fn defaults_with_a_route_are_valid() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn pool_capacity_below_minimum_is_rejected() {
        let mut config = valid();
        config.pool.capacity = 4;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "pool.capacity");

        config.pool.capacity = 5;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn all_errors_are_reported() {
        let mut config = valid();
        config.buffers.chunk_size = 0;
        config.bridge.max_pending = 0;
        config.routes.push(route("svc-a", "not a url"));

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"buffers.chunk_size"));
        assert!(fields.contains(&"bridge.max_pending"));
        assert!(fields.contains(&"routes[1]"));
        assert!(fields.contains(&"routes[1].target"));
    }

    #[test]
    fn bridge_job_limit_is_bounded() {
        let mut config = valid();
        config.bridge.max_pending = MAX_PENDING_LIMIT + 1;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "bridge.max_pending");

        config.bridge.max_pending = MAX_PENDING_LIMIT;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_routes_are_rejected() {
        let config = GatewayConfig::default();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "routes"));
    }
}
