use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::app::GatewayState;
use crate::auth::{AuthOutcome, Claims};
use crate::error::ApiError;

/// Authenticated caller, attached to request extensions after the guard accepts a credential
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub subject: String,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self { subject: claims.sub }
    }
}

/// Runs the auth guard before anything else sees the request.
///
/// Denials short-circuit with a uniform 401; no backend is contacted.
pub async fn auth_guard_middleware(
    State(state): State<Arc<GatewayState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let outcome = state
        .guard
        .authenticate(request.method(), request.uri().path(), request.headers());

    match outcome {
        AuthOutcome::Exempt => Ok(next.run(request).await),
        AuthOutcome::Authenticated(claims) => {
            request.extensions_mut().insert(AuthUser::from(claims));
            Ok(next.run(request).await)
        }
        AuthOutcome::Denied(reason) => {
            tracing::debug!(
                reason = reason.as_str(),
                method = %request.method(),
                path = %request.uri().path(),
                "request denied by auth guard"
            );
            Err(ApiError::unauthorized())
        }
    }
}
