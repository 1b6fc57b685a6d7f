use axum::http::{request::Parts, HeaderValue};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::config::SecurityConfig;

/// Which request origins get CORS headers: an exact list plus `*`-wildcard patterns
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    exact: Vec<String>,
    patterns: Vec<String>,
}

impl OriginPolicy {
    pub fn new(exact: Vec<String>, patterns: Vec<String>) -> Self {
        Self { exact, patterns }
    }

    pub fn allows(&self, origin: &str) -> bool {
        self.exact.iter().any(|o| o == origin)
            || self.patterns.iter().any(|p| wildcard_match(p, origin))
    }
}

/// Permissive CORS with credentials. Methods and headers mirror the preflight request,
/// since wildcards are not allowed together with credentials.
pub fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    let policy = OriginPolicy::new(
        security.cors_origins.clone(),
        security.cors_origin_patterns.clone(),
    );

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                origin.to_str().map(|o| policy.allows(o)).unwrap_or(false)
            },
        ))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

/// Glob match where `*` stands for any run of characters, including none
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p = pattern.as_bytes();
    let t = text.as_bytes();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && p[pi] == b'*' {
            star = Some((pi, ti));
            pi += 1;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some((star_pi, star_ti)) = star {
            // Let the last star swallow one more character
            pi = star_pi + 1;
            ti = star_ti + 1;
            star = Some((star_pi, star_ti + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == b'*')
}
