pub mod auth;

pub use auth::{auth_guard_middleware, AuthUser};
