#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
    Json, Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;

use campus_gateway::config::{BackendRegistry, GatewayConfig};
use campus_gateway::routing::Backend;

pub const SECRET: &str = "test-secret";

/// Cookies handed out by `/set-cookies/{n}`, in order
pub const STUB_COOKIES: [&str; 3] = [
    "sid=one; Path=/; HttpOnly",
    "sid=two; Path=/api; Secure",
    "theme=dark; Max-Age=3600; SameSite=Lax",
];

pub const SESSIONS_BODY: &str = r#"{"ok":true,"sessions":[]}"#;

/// Backend stand-in that counts calls and echoes what it received
pub struct StubBackend {
    pub addr: SocketAddr,
    calls: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
}

impl StubBackend {
    pub async fn spawn(backend: Backend) -> Result<Self> {
        let calls = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        let state = StubState {
            name: backend.name(),
            calls: calls.clone(),
            completed: completed.clone(),
        };
        let router = Router::new().fallback(stub_handler).with_state(state);
        let addr = serve(router).await?;
        Ok(Self {
            addr,
            calls,
            completed,
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `/sleep/{ms}` requests that ran to the end of their delay
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
struct StubState {
    name: &'static str,
    calls: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
}

async fn stub_handler(
    State(state): State<StubState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.calls.fetch_add(1, Ordering::SeqCst);
    let path = uri.path();

    if let Some(n) = path.strip_prefix("/set-cookies/") {
        let n: usize = n.parse().unwrap_or(0);
        let mut response = (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("{} cookies", n),
        )
            .into_response();
        for cookie in STUB_COOKIES.iter().take(n) {
            response
                .headers_mut()
                .append(header::SET_COOKIE, HeaderValue::from_static(cookie));
        }
        return response;
    }

    if let Some(ms) = path.strip_prefix("/sleep/") {
        let ms: u64 = ms.parse().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        state.completed.fetch_add(1, Ordering::SeqCst);
        return format!("slept {}ms", ms).into_response();
    }

    match path {
        "/slow" => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            return "too late".into_response();
        }
        "/open-cors" => {
            return (
                [
                    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
                    (header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true"),
                ],
                "open",
            )
                .into_response()
        }
        "/redirect" => return Redirect::temporary("/landing").into_response(),
        "/teapot" => {
            return (
                StatusCode::IM_A_TEAPOT,
                [(header::CONTENT_TYPE, "application/problem+json")],
                r#"{"title":"short and stout"}"#,
            )
                .into_response()
        }
        _ => {}
    }

    if state.name == "sessions" && path == "/" && method == Method::GET {
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            SESSIONS_BODY,
        )
            .into_response();
    }

    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    let traces: Vec<String> = headers
        .get_all("x-trace")
        .iter()
        .filter_map(|v| v.to_str().ok().map(str::to_string))
        .collect();

    Json(json!({
        "backend": state.name,
        "method": method.as_str(),
        "path": path,
        "query": uri.query(),
        "host": header_str("host"),
        "cookie": header_str("cookie"),
        "subject": header_str("x-authenticated-subject"),
        "content_type": header_str("content-type"),
        "traces": traces,
        "body": body.to_vec(),
    }))
    .into_response()
}

async fn serve(router: Router) -> Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .context("failed to bind test listener")?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok(addr)
}

/// A gateway wired to one stub per backend
pub struct Harness {
    pub base_url: String,
    pub client: reqwest::Client,
    stubs: HashMap<Backend, StubBackend>,
}

impl Harness {
    pub async fn start() -> Result<Self> {
        Self::start_with(|_| {}).await
    }

    pub async fn start_with(customize: impl FnOnce(&mut GatewayConfig)) -> Result<Self> {
        let mut stubs = HashMap::new();
        for backend in Backend::ALL {
            stubs.insert(backend, StubBackend::spawn(backend).await?);
        }

        let url = |b: Backend| stubs[&b].base_url();
        let registry = BackendRegistry::new(
            url(Backend::Auth),
            url(Backend::Students),
            url(Backend::Users),
            url(Backend::Sessions),
            url(Backend::Messaging),
            url(Backend::Library),
        )?;

        let mut config = GatewayConfig::development(registry);
        config.security.jwt_secret = SECRET.to_string();
        config.proxy.upstream_timeout = Duration::from_secs(2);
        config.proxy.connect_timeout = Duration::from_secs(1);
        customize(&mut config);
        config.validate()?;

        let app = campus_gateway::app(&config)?;
        let addr = serve(app).await?;

        Ok(Self {
            base_url: format!("http://{}", addr),
            client: reqwest::Client::new(),
            stubs,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn stub(&self, backend: Backend) -> &StubBackend {
        &self.stubs[&backend]
    }

    /// Calls received across every stub backend
    pub fn total_calls(&self) -> usize {
        self.stubs.values().map(StubBackend::calls).sum()
    }
}

pub fn token(subject: &str) -> String {
    token_with(subject, SECRET, 3600)
}

/// HS256 token expiring `ttl_secs` from now (negative means already expired)
pub fn token_with(subject: &str, secret: &str, ttl_secs: i64) -> String {
    let exp = chrono::Utc::now().timestamp() + ttl_secs;
    encode(
        &Header::default(),
        &json!({ "sub": subject, "exp": exp }),
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to sign test token")
}

pub fn auth_cookie(token: &str) -> String {
    format!("access_token={}", token)
}
