use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::auth::{Allowlist, AuthGuard};
use crate::config::{ConfigError, GatewayConfig};
use crate::cors::cors_layer;
use crate::handlers;
use crate::proxy::Forwarder;
use crate::routing::RouteTable;

/// Read-only state shared by every request task
#[derive(Debug)]
pub struct GatewayState {
    pub routes: RouteTable,
    pub guard: AuthGuard,
    pub forwarder: Forwarder,
    pub max_body_bytes: usize,
}

impl GatewayState {
    pub fn new(config: &GatewayConfig, routes: RouteTable, allowlist: Allowlist) -> Result<Self, ConfigError> {
        Ok(Self {
            routes,
            guard: AuthGuard::new(&config.security, allowlist),
            forwarder: Forwarder::new(config.backends.clone(), &config.proxy)?,
            max_body_bytes: config.proxy.max_body_bytes,
        })
    }

    /// Default route table and allowlist
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ConfigError> {
        Self::new(config, RouteTable::default_table()?, Allowlist::default())
    }
}

/// Build the gateway router from configuration
pub fn app(config: &GatewayConfig) -> Result<Router, ConfigError> {
    let state = Arc::new(GatewayState::from_config(config)?);
    Ok(router(state, config))
}

/// Layer order, outermost first: trace, CORS, auth guard, body limit. CORS sits outside the
/// guard so 401s carry CORS headers too.
pub fn router(state: Arc<GatewayState>, config: &GatewayConfig) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .fallback(handlers::proxy)
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::auth_guard_middleware,
        ))
        .layer(cors_layer(&config.security))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
