use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Extension,
};

use crate::app::GatewayState;
use crate::error::{ApiError, ProxyError};
use crate::middleware::AuthUser;
use crate::proxy::InflightRequest;
use crate::routing::{proxied_methods, RouteError};

/// Catch-all handler: route the request and forward it to its backend
pub async fn proxy(
    State(state): State<Arc<GatewayState>>,
    auth_user: Option<Extension<AuthUser>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    // Plain OPTIONS (not a CORS preflight) is answered here and never forwarded
    if method == Method::OPTIONS {
        return Ok(options_response());
    }

    let route = state.routes.resolve(&method, uri.path()).map_err(|e| {
        tracing::debug!(method = %method, path = %uri.path(), "no route: {:?}", e);
        match e {
            RouteError::NoRoute => ApiError::not_found("No route for this path"),
            RouteError::MethodNotAllowed { allowed } => ApiError::method_not_allowed(allowed),
        }
    })?;

    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ProxyError::BodyTooLarge {
                limit: state.max_body_bytes,
            }
        } else {
            ProxyError::RequestBody(rejection.body_text())
        }
    })?;

    let request = InflightRequest {
        method,
        query: uri.query().map(str::to_string),
        headers,
        body,
        subject: auth_user.map(|Extension(user)| user.subject),
    };

    Ok(state.forwarder.forward(&route, request).await?)
}

fn options_response() -> Response {
    let mut methods = proxied_methods();
    methods.push(Method::OPTIONS);
    let allow = methods.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");

    let mut response = (StatusCode::OK, Body::empty()).into_response();
    if let Ok(value) = HeaderValue::from_str(&allow) {
        response.headers_mut().insert(header::ALLOW, value);
    }
    response
}
