//! Outbound forwarding to backend services and relay of their responses.

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method},
    response::Response,
};
use tracing::{debug, error, warn};

use crate::config::{BackendRegistry, ProxyConfig};
use crate::error::ProxyError;
use crate::routing::RouteMatch;

/// Connection-specific request headers the outbound client recomputes
const REQUEST_SKIP: [HeaderName; 3] = [
    header::HOST,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
];

/// Framing headers regenerated by the gateway's own transport
const RESPONSE_SKIP: [HeaderName; 3] = [
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::CONNECTION,
];

/// Per-request state handed from the handler to the forwarder
#[derive(Debug, Clone)]
pub struct InflightRequest {
    pub method: Method,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Verified subject, if the request carried a valid credential
    pub subject: Option<String>,
}

/// HTTP client for forwarding requests to backend services
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    backends: BackendRegistry,
    identity_header: Option<HeaderName>,
}

impl Forwarder {
    pub fn new(backends: BackendRegistry, config: &ProxyConfig) -> Result<Self, reqwest::Error> {
        // Bodies are relayed byte-for-byte, so the client must not decompress them
        let client = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .connect_timeout(config.connect_timeout)
            .no_gzip()
            .tcp_keepalive(std::time::Duration::from_secs(30))
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .build()?;

        let identity_header = config
            .identity_header
            .as_deref()
            .and_then(|name| HeaderName::from_bytes(name.as_bytes()).ok());

        Ok(Self {
            client,
            backends,
            identity_header,
        })
    }

    /// `base[/sub_path][?query]`, query copied verbatim
    pub fn target_url(&self, route: &RouteMatch, query: Option<&str>) -> String {
        let mut url = self.backends.base_url(route.backend).to_string();

        if !route.sub_path.is_empty() {
            url.push('/');
            url.push_str(route.sub_path.trim_start_matches('/'));
        }
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }

        url
    }

    /// Send one request to the matched backend and relay its response.
    ///
    /// No retries: a failed send surfaces as a `ProxyError` and the caller decides the
    /// response.
    pub async fn forward(
        &self,
        route: &RouteMatch,
        request: InflightRequest,
    ) -> Result<Response, ProxyError> {
        let url = self.target_url(route, request.query.as_deref());
        let headers = outbound_headers(
            &request.headers,
            self.identity_header.as_ref(),
            request.subject.as_deref(),
        );

        debug!(
            route = %route.prefix,
            backend = %route.backend,
            method = %request.method,
            "forwarding request"
        );

        let result = self
            .client
            .request(request.method, &url)
            .headers(headers)
            .body(request.body)
            .send()
            .await;

        let upstream = match result {
            Ok(upstream) => upstream,
            Err(e) => return Err(self.log_failure(route, ProxyError::from(e))),
        };

        let status = upstream.status();
        let upstream_headers = upstream.headers().clone();
        let body = match upstream.bytes().await {
            Ok(body) => body,
            Err(e) => return Err(self.log_failure(route, ProxyError::from(e))),
        };

        if status.is_server_error() {
            warn!(
                route = %route.prefix,
                backend = %route.backend,
                status = status.as_u16(),
                "backend returned server error"
            );
        }

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = relay_headers(&upstream_headers);

        Ok(response)
    }

    fn log_failure(&self, route: &RouteMatch, err: ProxyError) -> ProxyError {
        error!(
            route = %route.prefix,
            backend = %route.backend,
            upstream = %self.backends.base_url(route.backend),
            class = err.class(),
            error = %err,
            "failed to forward request to backend"
        );
        err
    }
}

/// Inbound headers minus connection-specific ones, with the identity header replaced by
/// the verified subject.
pub fn outbound_headers(
    inbound: &HeaderMap,
    identity_header: Option<&HeaderName>,
    subject: Option<&str>,
) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len() + 1);

    for (name, value) in inbound.iter() {
        if REQUEST_SKIP.contains(name) || identity_header == Some(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    if let (Some(name), Some(subject)) = (identity_header, subject) {
        match HeaderValue::from_str(subject) {
            Ok(value) => {
                headers.insert(name.clone(), value);
            }
            Err(_) => warn!("subject is not a valid header value; identity header omitted"),
        }
    }

    headers
}

/// Backend response headers as the caller should see them. Every `Set-Cookie` instance is
/// kept, in order and untouched. `Access-Control-*` headers are dropped; the gateway's own
/// CORS layer is the only source of them.
pub fn relay_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());

    for (name, value) in upstream.iter() {
        if RESPONSE_SKIP.contains(name)
            || *name == header::SET_COOKIE
            || name.as_str().starts_with("access-control-")
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    for cookie in upstream.get_all(header::SET_COOKIE) {
        headers.append(header::SET_COOKIE, cookie.clone());
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::Backend;
    use std::time::Duration;

    fn forwarder() -> Forwarder {
        let mut backends = BackendRegistry::uniform("http://127.0.0.1:4011").unwrap();
        backends.set(Backend::Library, "http://library.internal:4018/").unwrap();
        let config = ProxyConfig {
            upstream_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(1),
            max_body_bytes: 1024,
            identity_header: Some("x-authenticated-subject".to_string()),
        };
        Forwarder::new(backends, &config).unwrap()
    }

    fn route(backend: Backend, sub_path: &str) -> RouteMatch {
        RouteMatch {
            prefix: "/test".to_string(),
            backend,
            sub_path: sub_path.to_string(),
        }
    }

    #[test]
    fn test_target_url() {
        let forwarder = forwarder();

        assert_eq!(
            forwarder.target_url(&route(Backend::Library, "resources"), None),
            "http://library.internal:4018/resources"
        );
        assert_eq!(
            forwarder.target_url(&route(Backend::Students, ""), Some("page=2&sort=name")),
            "http://127.0.0.1:4011?page=2&sort=name"
        );
        assert_eq!(
            forwarder.target_url(&route(Backend::Students, "courses/"), Some("")),
            "http://127.0.0.1:4011/courses/"
        );
        assert_eq!(
            forwarder.target_url(&route(Backend::Students, "a%20b"), Some("q=%E2%9C%93&q=2")),
            "http://127.0.0.1:4011/a%20b?q=%E2%9C%93&q=2"
        );
    }

    #[test]
    fn test_outbound_headers_filtering() {
        let identity = HeaderName::from_static("x-authenticated-subject");
        let mut inbound = HeaderMap::new();
        inbound.insert(header::HOST, HeaderValue::from_static("gateway:4000"));
        inbound.insert(header::CONTENT_LENGTH, HeaderValue::from_static("12"));
        inbound.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        inbound.insert(header::COOKIE, HeaderValue::from_static("access_token=abc; theme=dark"));
        inbound.append("x-trace", HeaderValue::from_static("one"));
        inbound.append("x-trace", HeaderValue::from_static("two"));
        inbound.insert("x-authenticated-subject", HeaderValue::from_static("spoofed"));

        let headers = outbound_headers(&inbound, Some(&identity), Some("2012345"));

        assert!(headers.get(header::HOST).is_none());
        assert!(headers.get(header::CONTENT_LENGTH).is_none());
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(headers[header::COOKIE], "access_token=abc; theme=dark");
        let traces: Vec<_> = headers.get_all("x-trace").iter().collect();
        assert_eq!(traces, vec!["one", "two"]);
        let subjects: Vec<_> = headers.get_all(&identity).iter().collect();
        assert_eq!(subjects, vec!["2012345"]);
    }

    #[test]
    fn test_outbound_headers_strip_identity_without_subject() {
        let identity = HeaderName::from_static("x-authenticated-subject");
        let mut inbound = HeaderMap::new();
        inbound.insert("x-authenticated-subject", HeaderValue::from_static("spoofed"));

        let headers = outbound_headers(&inbound, Some(&identity), None);
        assert!(headers.get(&identity).is_none());
    }

    #[test]
    fn test_relay_headers_keeps_every_set_cookie() {
        let mut upstream = HeaderMap::new();
        upstream.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        upstream.insert(header::CONTENT_LENGTH, HeaderValue::from_static("99"));
        upstream.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        upstream.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        upstream.append(header::SET_COOKIE, HeaderValue::from_static("a=1; Path=/; HttpOnly"));
        upstream.append(header::SET_COOKIE, HeaderValue::from_static("b=2; Max-Age=0"));
        upstream.append(header::SET_COOKIE, HeaderValue::from_static("a=3; SameSite=Lax"));
        upstream.append(header::VARY, HeaderValue::from_static("Origin"));
        upstream.append(header::VARY, HeaderValue::from_static("Cookie"));

        let headers = relay_headers(&upstream);

        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert!(headers.get(header::CONTENT_LENGTH).is_none());
        assert!(headers.get(header::TRANSFER_ENCODING).is_none());
        assert!(headers.get(header::CONNECTION).is_none());

        let cookies: Vec<_> = headers.get_all(header::SET_COOKIE).iter().collect();
        assert_eq!(
            cookies,
            vec!["a=1; Path=/; HttpOnly", "b=2; Max-Age=0", "a=3; SameSite=Lax"]
        );
        assert_eq!(headers.get_all(header::VARY).iter().count(), 2);
    }

    #[test]
    fn test_relay_headers_drops_backend_cors() {
        let mut upstream = HeaderMap::new();
        upstream.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        upstream.insert(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        upstream.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, HeaderValue::from_static("x-total"));
        upstream.insert("x-total", HeaderValue::from_static("12"));

        let headers = relay_headers(&upstream);

        assert!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
        assert!(headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).is_none());
        assert!(headers.get(header::ACCESS_CONTROL_EXPOSE_HEADERS).is_none());
        assert_eq!(headers["x-total"], "12");
    }
}
