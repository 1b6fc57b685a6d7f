pub mod allowlist;

use axum::http::{header, HeaderMap, Method};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::SecurityConfig;

pub use allowlist::{Allowlist, PathRule};

/// Decoded credential payload. Claims the gateway does not interpret are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Why a request was denied. Never shown to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    MissingCredential,
    InvalidCredential,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::MissingCredential => "missing_credential",
            DenyReason::InvalidCredential => "invalid_credential",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    /// Allowlisted path or method; no credential was inspected
    Exempt,
    Authenticated(Claims),
    Denied(DenyReason),
}

/// Decides allow/deny for inbound requests from static configuration
#[derive(Clone)]
pub struct AuthGuard {
    cookie_name: String,
    decoding_key: DecodingKey,
    validation: Validation,
    allowlist: Allowlist,
}

impl std::fmt::Debug for AuthGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of debug output
        f.debug_struct("AuthGuard")
            .field("cookie_name", &self.cookie_name)
            .field("algorithms", &self.validation.algorithms)
            .field("allowlist", &self.allowlist)
            .finish()
    }
}

impl AuthGuard {
    pub fn new(security: &SecurityConfig, allowlist: Allowlist) -> Self {
        let mut validation = Validation::new(security.jwt_algorithm);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["sub"]);

        Self {
            cookie_name: security.cookie_name.clone(),
            decoding_key: DecodingKey::from_secret(security.jwt_secret.as_bytes()),
            validation,
            allowlist,
        }
    }

    pub fn authenticate(&self, method: &Method, path: &str, headers: &HeaderMap) -> AuthOutcome {
        if self.allowlist.is_exempt(method, path) {
            return AuthOutcome::Exempt;
        }

        let Some(token) = extract_cookie(headers, &self.cookie_name) else {
            return AuthOutcome::Denied(DenyReason::MissingCredential);
        };

        match self.verify(&token) {
            Ok(claims) => AuthOutcome::Authenticated(claims),
            Err(e) => {
                tracing::debug!(error = %e, "credential rejected");
                AuthOutcome::Denied(DenyReason::InvalidCredential)
            }
        }
    }

    /// Verify signature, algorithm and expiry, then decode the claims
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding_key, &self.validation).map(|data| data.claims)
    }
}

/// Value of the named cookie across every `Cookie` header on the request.
/// An empty value counts as absent.
pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key.trim() == name).then(|| value.trim().trim_matches('"').to_string())
        })
        .find(|value| !value.is_empty())
}
