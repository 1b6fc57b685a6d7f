// HTTP API Error Types
use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

/// Errors the gateway itself answers with. Messages are client-safe.
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 404 Not Found
    NotFound(String),

    // 405 Method Not Allowed
    MethodNotAllowed { message: String, allowed: Vec<Method> },

    // 413 Payload Too Large
    PayloadTooLarge(String),

    // 502 Bad Gateway (upstream refused, unreachable or malformed)
    BadGateway(String),

    // 504 Gateway Timeout
    GatewayTimeout(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::MethodNotAllowed { message, .. } => message,
            ApiError::PayloadTooLarge(msg) => msg,
            ApiError::BadGateway(msg) => msg,
            ApiError::GatewayTimeout(msg) => msg,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::NotFound(_) => "not_found",
            ApiError::MethodNotAllowed { .. } => "method_not_allowed",
            ApiError::PayloadTooLarge(_) => "payload_too_large",
            ApiError::BadGateway(_) => "upstream_unavailable",
            ApiError::GatewayTimeout(_) => "upstream_timeout",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "success": false,
            "error": self.error_code(),
            "message": self.message(),
        })
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn unauthorized() -> Self {
        ApiError::Unauthorized("Authentication required".to_string())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn method_not_allowed(allowed: Vec<Method>) -> Self {
        ApiError::MethodNotAllowed {
            message: "Method not allowed on this route".to_string(),
            allowed,
        }
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        ApiError::PayloadTooLarge(message.into())
    }

    pub fn bad_gateway() -> Self {
        ApiError::BadGateway("Upstream service unavailable".to_string())
    }

    pub fn gateway_timeout() -> Self {
        ApiError::GatewayTimeout("Upstream service did not respond in time".to_string())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let mut response = (self.status_code(), Json(self.to_json())).into_response();

        if let ApiError::MethodNotAllowed { allowed, .. } = &self {
            let allow = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
            if let Ok(value) = HeaderValue::from_str(&allow) {
                response.headers_mut().insert(header::ALLOW, value);
            }
        }

        response
    }
}

/// Failures inside the forwarder. Details are for logs only.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("request body could not be read: {0}")]
    RequestBody(String),

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("invalid upstream target {0}")]
    InvalidTarget(String),

    #[error("upstream timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    #[error("upstream unavailable: {0}")]
    Unavailable(#[source] reqwest::Error),

    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),
}

impl ProxyError {
    /// Short class name for structured logs
    pub fn class(&self) -> &'static str {
        match self {
            ProxyError::RequestBody(_) => "request_body",
            ProxyError::BodyTooLarge { .. } => "body_too_large",
            ProxyError::InvalidTarget(_) => "invalid_target",
            ProxyError::Timeout(_) => "timeout",
            ProxyError::Unavailable(_) => "unavailable",
            ProxyError::MalformedResponse(_) => "malformed_response",
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProxyError::Timeout(err)
        } else if err.is_builder() {
            ProxyError::InvalidTarget(err.to_string())
        } else if err.is_decode() || err.is_body() {
            ProxyError::MalformedResponse(err.to_string())
        } else {
            ProxyError::Unavailable(err)
        }
    }
}

impl From<ProxyError> for ApiError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::BodyTooLarge { limit } => {
                ApiError::payload_too_large(format!("Request body exceeds {} bytes", limit))
            }
            ProxyError::RequestBody(_) => ApiError::bad_request("Request body could not be read"),
            ProxyError::Timeout(_) => ApiError::gateway_timeout(),
            // Upstream addresses and transport details stay in the logs
            ProxyError::InvalidTarget(_)
            | ProxyError::Unavailable(_)
            | ProxyError::MalformedResponse(_) => ApiError::bad_gateway(),
        }
    }
}
