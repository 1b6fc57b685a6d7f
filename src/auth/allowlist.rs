use axum::http::Method;

/// One allowlisted path predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRule {
    Exact(String),
    /// Raw string prefix: `/auth` also covers `/authors`
    Prefix(String),
}

impl PathRule {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathRule::Exact(p) => path == p,
            PathRule::Prefix(p) => path.starts_with(p.as_str()),
        }
    }
}

/// Requests exempt from credential checks
#[derive(Debug, Clone)]
pub struct Allowlist {
    rules: Vec<PathRule>,
    methods: Vec<Method>,
}

impl Allowlist {
    pub fn new(rules: Vec<PathRule>, methods: Vec<Method>) -> Self {
        Self { rules, methods }
    }

    pub fn is_exempt(&self, method: &Method, path: &str) -> bool {
        self.methods.contains(method) || self.rules.iter().any(|rule| rule.matches(path))
    }
}

impl Default for Allowlist {
    fn default() -> Self {
        Self::new(
            vec![
                PathRule::Prefix("/auth".to_string()),
                PathRule::Exact("/health".to_string()),
                PathRule::Exact("/students/health".to_string()),
            ],
            vec![Method::OPTIONS],
        )
    }
}
