//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up the matching route for a request
//! - Own the backend scope of every route
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan in priority order (acceptable for typical route counts)
//! - Explicit `None` rather than a silent default route

use std::path::PathBuf;
use std::sync::Arc;

use crate::backend::BackendScope;
use crate::client_pool::DestinationKey;
use crate::config::RouteConfig;
use crate::driver::InboundRequest;
use crate::error::TransportError;
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher};

/// Errors from compiling the route table.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("route {route}: {source}")]
    InvalidTarget {
        route: String,
        #[source]
        source: TransportError,
    },
}

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    pub name: String,
    pub destination: DestinationKey,
    pub scope: Arc<BackendScope>,
    pub priority: u32,
    matcher: AndMatcher,
}

impl Route {
    pub fn new(
        name: impl Into<String>,
        destination: DestinationKey,
        scope: Arc<BackendScope>,
        priority: u32,
        matchers: Vec<Box<dyn Matcher>>,
    ) -> Self {
        Self {
            name: name.into(),
            destination,
            scope,
            priority,
            matcher: AndMatcher::new(matchers),
        }
    }

    pub fn matches(&self, req: &InboundRequest) -> bool {
        self.matcher.matches(req)
    }
}

/// Immutable route table, highest priority first.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Arc<Route>>,
}

impl Router {
    pub fn new(mut routes: Vec<Route>) -> Self {
        // Stable sort keeps config order among equal priorities.
        routes.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self {
            routes: routes.into_iter().map(Arc::new).collect(),
        }
    }

    /// Compile configured routes, creating one backend scope per route.
    pub fn from_config(configs: &[RouteConfig]) -> Result<Self, RouteError> {
        let mut routes = Vec::with_capacity(configs.len());

        for config in configs {
            let destination = DestinationKey::parse(&config.target).map_err(|source| RouteError::InvalidTarget {
                route: config.name.clone(),
                source,
            })?;

            let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
            if let Some(host) = &config.host {
                matchers.push(Box::new(HostMatcher::new(host)));
            }
            if let Some(prefix) = &config.path_prefix {
                matchers.push(Box::new(PathPrefixMatcher::new(prefix)));
            }

            let scope = Arc::new(BackendScope::new(
                config.name.clone(),
                config.identity_path.as_ref().map(PathBuf::from),
            ));
            routes.push(Route::new(config.name.clone(), destination, scope, config.priority, matchers));
        }

        Ok(Self::new(routes))
    }

    /// First route, in priority order, whose conditions all hold.
    pub fn match_request(&self, req: &InboundRequest) -> Option<Arc<Route>> {
        self.routes.iter().find(|route| route.matches(req)).cloned()
    }

    /// Backend scopes of every route, in priority order.
    pub fn scopes(&self) -> Vec<Arc<BackendScope>> {
        self.routes.iter().map(|route| route.scope.clone()).collect()
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
