pub mod app;
pub mod auth;
pub mod config;
pub mod cors;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod proxy;
pub mod routing;

pub use app::{app, router, GatewayState};
pub use config::GatewayConfig;
