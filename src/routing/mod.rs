//! Static route table: path prefix → (backend, rewrite rule).
//!
//! The table is built once at startup and only read afterwards. Entries are kept sorted by
//! prefix length, longest first, so a more specific prefix always wins over a shorter one.

use axum::http::Method;

use crate::config::ConfigError;

/// Logical backend services behind the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Auth,
    Students,
    Users,
    Sessions,
    Messaging,
    Library,
}

impl Backend {
    pub const ALL: [Backend; 6] = [
        Backend::Auth,
        Backend::Students,
        Backend::Users,
        Backend::Sessions,
        Backend::Messaging,
        Backend::Library,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Auth => "auth",
            Backend::Students => "students",
            Backend::Users => "users",
            Backend::Sessions => "sessions",
            Backend::Messaging => "messaging",
            Backend::Library => "library",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How the remainder of a matched path becomes the backend sub-path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteKind {
    /// Forward the remainder unchanged
    Forward,
    /// Always forward to a fixed sub-path
    ForwardConstant(String),
    /// Prepend a fixed segment to the remainder
    ForwardPrefixSplice(String),
}

impl RouteKind {
    pub fn rewrite(&self, remainder: &str) -> String {
        match self {
            RouteKind::Forward => remainder.to_string(),
            RouteKind::ForwardConstant(target) => target.clone(),
            RouteKind::ForwardPrefixSplice(segment) => format!("{}/{}", segment, remainder),
        }
    }
}

/// Which request paths an entry covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMatch {
    /// Only the prefix itself, e.g. `/students`
    Exact,
    /// `prefix/` and everything below it; the remainder is what follows `prefix/`
    Subtree,
}

#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub prefix: String,
    pub path_match: PathMatch,
    pub backend: Backend,
    pub kind: RouteKind,
    pub methods: Vec<Method>,
}

impl RouteEntry {
    fn new(prefix: &str, path_match: PathMatch, backend: Backend, kind: RouteKind) -> Self {
        Self {
            prefix: prefix.to_string(),
            path_match,
            backend,
            kind,
            methods: proxied_methods(),
        }
    }

    fn only(mut self, methods: &[Method]) -> Self {
        self.methods = methods.to_vec();
        self
    }

    /// Remainder of `path` after this entry's prefix, if the entry covers the path
    fn remainder<'a>(&self, path: &'a str) -> Option<&'a str> {
        match self.path_match {
            PathMatch::Exact => (path == self.prefix).then_some(""),
            PathMatch::Subtree => path.strip_prefix(self.prefix.as_str())?.strip_prefix('/'),
        }
    }

    pub fn allows(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }
}

/// Result of routing one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// Prefix of the entry that matched; used for logging
    pub prefix: String,
    pub backend: Backend,
    pub sub_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    NoRoute,
    MethodNotAllowed { allowed: Vec<Method> },
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    /// Sort entries longest prefix first. Two entries covering the same paths with a
    /// shared method would make the winner depend on declaration order, so they are rejected.
    pub fn new(mut entries: Vec<RouteEntry>) -> Result<Self, ConfigError> {
        for (i, entry) in entries.iter().enumerate() {
            let conflict = entries[i + 1..].iter().find(|other| {
                other.prefix == entry.prefix
                    && other.path_match == entry.path_match
                    && other.methods.iter().any(|m| entry.allows(m))
            });
            if let Some(other) = conflict {
                return Err(ConfigError::AmbiguousRoute {
                    prefix: entry.prefix.clone(),
                    first: entry.backend.name(),
                    second: other.backend.name(),
                });
            }
        }

        // Stable sort keeps declaration order among equal-length prefixes
        entries.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Ok(Self { entries })
    }

    /// The gateway's public routes
    pub fn default_table() -> Result<Self, ConfigError> {
        use Backend::*;
        use PathMatch::*;

        Self::new(vec![
            RouteEntry::new("/auth", Exact, Auth, RouteKind::Forward),
            RouteEntry::new("/auth", Subtree, Auth, RouteKind::Forward),
            RouteEntry::new("/students", Exact, Students, RouteKind::Forward),
            RouteEntry::new("/students", Subtree, Students, RouteKind::Forward),
            RouteEntry::new(
                "/register",
                Exact,
                Students,
                RouteKind::ForwardConstant("register".to_string()),
            )
            .only(&[Method::POST]),
            RouteEntry::new("/sessions", Exact, Sessions, RouteKind::Forward).only(&[Method::GET]),
            RouteEntry::new("/sessions", Subtree, Sessions, RouteKind::Forward),
            RouteEntry::new("/messaging", Exact, Messaging, RouteKind::Forward),
            RouteEntry::new("/messaging", Subtree, Messaging, RouteKind::Forward),
            RouteEntry::new(
                "/courses",
                Exact,
                Students,
                RouteKind::ForwardConstant("courses".to_string()),
            ),
            RouteEntry::new(
                "/courses",
                Subtree,
                Students,
                RouteKind::ForwardPrefixSplice("courses".to_string()),
            ),
            RouteEntry::new("/library", Subtree, Library, RouteKind::Forward),
            RouteEntry::new("/users", Subtree, Users, RouteKind::Forward),
        ])
    }

    /// Longest-prefix-first, first-match-wins lookup.
    ///
    /// A path covered only by entries that exclude `method` is `MethodNotAllowed`; a path
    /// covered by nothing is `NoRoute`.
    pub fn resolve(&self, method: &Method, path: &str) -> Result<RouteMatch, RouteError> {
        let mut allowed: Vec<Method> = Vec::new();

        for entry in &self.entries {
            let Some(remainder) = entry.remainder(path) else {
                continue;
            };

            if entry.allows(method) {
                return Ok(RouteMatch {
                    prefix: entry.prefix.clone(),
                    backend: entry.backend,
                    sub_path: entry.kind.rewrite(remainder),
                });
            }

            for m in &entry.methods {
                if !allowed.contains(m) {
                    allowed.push(m.clone());
                }
            }
        }

        if allowed.is_empty() {
            Err(RouteError::NoRoute)
        } else {
            Err(RouteError::MethodNotAllowed { allowed })
        }
    }
}

/// Methods forwarded on every route unless an entry narrows them
pub fn proxied_methods() -> Vec<Method> {
    vec![
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
    ]
}
