use std::env;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use thiserror::Error;
use url::Url;

use crate::routing::Backend;

/// Errors raised while assembling configuration at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid upstream address for {backend}: {value}")]
    InvalidUpstream { backend: &'static str, value: String },

    #[error("Unsupported JWT algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("Route {prefix} is claimed by both {first} and {second}")]
    AmbiguousRoute {
        prefix: String,
        first: &'static str,
        second: &'static str,
    },

    #[error("Failed to build upstream client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub backends: BackendRegistry,
    pub security: SecurityConfig,
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// HMAC key; empty means "not configured"
    pub jwt_secret: String,
    pub jwt_algorithm: Algorithm,
    pub cookie_name: String,
    pub cors_origins: Vec<String>,
    /// `*`-wildcard origin patterns, checked after the exact list
    pub cors_origin_patterns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub upstream_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_body_bytes: usize,
    /// Header that carries the verified subject to backends. `None` disables injection.
    pub identity_header: Option<String>,
}

/// Fixed backend addresses, one per logical backend.
#[derive(Debug, Clone)]
pub struct BackendRegistry {
    auth: String,
    students: String,
    users: String,
    sessions: String,
    messaging: String,
    library: String,
}

impl BackendRegistry {
    pub fn new(
        auth: impl Into<String>,
        students: impl Into<String>,
        users: impl Into<String>,
        sessions: impl Into<String>,
        messaging: impl Into<String>,
        library: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            auth: normalize_upstream(Backend::Auth, auth.into())?,
            students: normalize_upstream(Backend::Students, students.into())?,
            users: normalize_upstream(Backend::Users, users.into())?,
            sessions: normalize_upstream(Backend::Sessions, sessions.into())?,
            messaging: normalize_upstream(Backend::Messaging, messaging.into())?,
            library: normalize_upstream(Backend::Library, library.into())?,
        })
    }

    /// Every backend at the same address. Handy for single-stub setups.
    pub fn uniform(base: impl Into<String>) -> Result<Self, ConfigError> {
        let base = base.into();
        Self::new(
            base.clone(),
            base.clone(),
            base.clone(),
            base.clone(),
            base.clone(),
            base,
        )
    }

    /// Base URL for a backend, without a trailing slash
    pub fn base_url(&self, backend: Backend) -> &str {
        match backend {
            Backend::Auth => &self.auth,
            Backend::Students => &self.students,
            Backend::Users => &self.users,
            Backend::Sessions => &self.sessions,
            Backend::Messaging => &self.messaging,
            Backend::Library => &self.library,
        }
    }

    pub fn set(&mut self, backend: Backend, base: impl Into<String>) -> Result<(), ConfigError> {
        let base = normalize_upstream(backend, base.into())?;
        match backend {
            Backend::Auth => self.auth = base,
            Backend::Students => self.students = base,
            Backend::Users => self.users = base,
            Backend::Sessions => self.sessions = base,
            Backend::Messaging => self.messaging = base,
            Backend::Library => self.library = base,
        }
        Ok(())
    }

    fn from_env() -> Result<Self, ConfigError> {
        let var = |name: &str, default: &str| env::var(name).unwrap_or_else(|_| default.to_string());

        Self::new(
            var("AUTH_UPSTREAM", "http://localhost:4010"),
            var("STUDENTS_UPSTREAM", "http://localhost:4011"),
            var("USERS_UPSTREAM", "http://localhost:4015"),
            var("SESSIONS_UPSTREAM", "http://localhost:4016"),
            var("MESSAGES_UPSTREAM", "http://localhost:4017"),
            var("LIBRARY_UPSTREAM", "http://localhost:4018"),
        )
    }
}

fn normalize_upstream(backend: Backend, value: String) -> Result<String, ConfigError> {
    let invalid = || ConfigError::InvalidUpstream {
        backend: backend.name(),
        value: value.clone(),
    };

    let parsed = Url::parse(value.trim()).map_err(|_| invalid())?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(invalid());
    }

    Ok(value.trim().trim_end_matches('/').to_string())
}

const DEFAULT_CORS_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "http://127.0.0.1:5173",
    "http://localhost",
    "http://127.0.0.1",
];

impl GatewayConfig {
    /// Load configuration from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        let base = match environment {
            Environment::Production => Self::production(BackendRegistry::from_env()?),
            Environment::Staging => Self::staging(BackendRegistry::from_env()?),
            Environment::Development => Self::development(BackendRegistry::from_env()?),
        };

        let config = base.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        // Server overrides
        if let Ok(v) = env::var("PORT") {
            self.server.port = parse_var("PORT", &v)?;
        }
        if let Ok(v) = env::var("BIND_ADDR") {
            self.server.bind_addr = v;
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("JWT_ALGORITHM") {
            self.security.jwt_algorithm = parse_algorithm(&v)?;
        }
        if let Ok(v) = env::var("AUTH_COOKIE_NAME") {
            self.security.cookie_name = v.trim().to_string();
        }
        if let Ok(v) = env::var("CORS_ORIGINS") {
            self.security.cors_origins = split_list(&v);
        }
        if let Ok(v) = env::var("CORS_ORIGIN_PATTERNS") {
            self.security.cors_origin_patterns = split_list(&v);
        }

        // Proxy overrides
        if let Ok(v) = env::var("GATEWAY_UPSTREAM_TIMEOUT_SECS") {
            self.proxy.upstream_timeout = Duration::from_secs(parse_var("GATEWAY_UPSTREAM_TIMEOUT_SECS", &v)?);
        }
        if let Ok(v) = env::var("GATEWAY_CONNECT_TIMEOUT_SECS") {
            self.proxy.connect_timeout = Duration::from_secs(parse_var("GATEWAY_CONNECT_TIMEOUT_SECS", &v)?);
        }
        if let Ok(v) = env::var("GATEWAY_MAX_BODY_BYTES") {
            self.proxy.max_body_bytes = parse_var("GATEWAY_MAX_BODY_BYTES", &v)?;
        }
        if let Ok(v) = env::var("GATEWAY_IDENTITY_HEADER") {
            let v = v.trim().to_ascii_lowercase();
            self.proxy.identity_header = if v.is_empty() { None } else { Some(v) };
        }

        Ok(self)
    }

    /// Check invariants that the profile defaults and overrides cannot guarantee on their own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.jwt_secret.is_empty() {
            return Err(ConfigError::Missing("JWT_SECRET"));
        }
        if self.security.cookie_name.is_empty() {
            return Err(ConfigError::Missing("AUTH_COOKIE_NAME"));
        }
        if self.proxy.upstream_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "GATEWAY_UPSTREAM_TIMEOUT_SECS",
                value: "0".to_string(),
            });
        }
        if let Some(name) = &self.proxy.identity_header {
            if axum::http::HeaderName::from_bytes(name.as_bytes()).is_err() {
                return Err(ConfigError::InvalidValue {
                    name: "GATEWAY_IDENTITY_HEADER",
                    value: name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn development(backends: BackendRegistry) -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                bind_addr: "0.0.0.0".to_string(),
                port: 4000,
            },
            backends,
            security: SecurityConfig {
                jwt_secret: "dev-secret".to_string(),
                jwt_algorithm: Algorithm::HS256,
                cookie_name: "access_token".to_string(),
                cors_origins: DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect(),
                cors_origin_patterns: vec!["*".to_string()],
            },
            proxy: ProxyConfig {
                upstream_timeout: Duration::from_secs(30),
                connect_timeout: Duration::from_secs(5),
                max_body_bytes: 10 * 1024 * 1024, // 10MB
                identity_header: Some("x-authenticated-subject".to_string()),
            },
        }
    }

    fn staging(backends: BackendRegistry) -> Self {
        let mut config = Self::development(backends);
        config.environment = Environment::Staging;
        config.proxy.max_body_bytes = 5 * 1024 * 1024; // 5MB
        config
    }

    fn production(backends: BackendRegistry) -> Self {
        let mut config = Self::development(backends);
        config.environment = Environment::Production;
        // No fallback secret outside development
        config.security.jwt_secret = String::new();
        config.security.cors_origins = Vec::new();
        config.proxy.upstream_timeout = Duration::from_secs(15);
        config.proxy.max_body_bytes = 2 * 1024 * 1024; // 2MB
        config
    }
}

fn parse_var<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    })
}

pub(crate) fn parse_algorithm(value: &str) -> Result<Algorithm, ConfigError> {
    match value.trim().to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => Err(ConfigError::UnsupportedAlgorithm(other.to_string())),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
