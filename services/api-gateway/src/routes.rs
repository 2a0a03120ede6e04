//! Public-route table. Anything the table does not list is protected.
//!
//! Pattern syntax, one rule per comma-separated entry:
//! - `=/path` matches the path exactly
//! - `*fragment` matches when the path contains `fragment`
//! - `/prefix` matches the prefix itself and anything below it, on segment
//!   boundaries (`/health` matches `/health/live` but not `/healthz`)
//! - any of the above may be preceded by an HTTP method (`GET /static/`)

use std::fmt;
use std::str::FromStr;

use axum::http::Method;
use thiserror::Error;

pub const DEFAULT_PUBLIC_ROUTES: &[&str] = &[
    "/auth/login",
    "/auth/register",
    "/auth/forgot-password",
    "/auth/reset-password",
    "=/",
    "/actuator/health",
    "/health",
    "*/swagger",
    "*/api-docs",
    "/v3/api-docs",
    "/static/",
    "/public/",
    "/assets/",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Public,
    Protected,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Public => "public",
            Classification::Protected => "protected",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteParseError {
    #[error("route pattern is empty")]
    Empty,
    #[error("route pattern '{0}' must start with '/', '=' or '*'")]
    InvalidPattern(String),
    #[error("unknown HTTP method in route pattern '{0}'")]
    InvalidMethod(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathMatcher {
    Exact(String),
    Contains(String),
    Prefix(String),
}

impl PathMatcher {
    fn matches(&self, path: &str) -> bool {
        match self {
            PathMatcher::Exact(exact) => path == exact,
            PathMatcher::Contains(fragment) => path.contains(fragment.as_str()),
            PathMatcher::Prefix(prefix) => prefix_matches(prefix, path),
        }
    }
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    let base = prefix.trim_end_matches('/');
    if base.is_empty() {
        return path.starts_with('/');
    }
    match path.strip_prefix(base) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    method: Option<Method>,
    matcher: PathMatcher,
}

impl RouteRule {
    pub fn matches(&self, method: &Method, path: &str) -> bool {
        if let Some(required) = &self.method {
            if required != method {
                return false;
            }
        }
        self.matcher.matches(path)
    }
}

impl FromStr for RouteRule {
    type Err = RouteParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(RouteParseError::Empty);
        }

        let (method, pattern) = match raw.split_once(char::is_whitespace) {
            Some((method, rest)) => {
                let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                    .map_err(|_| RouteParseError::InvalidMethod(raw.to_string()))?;
                (Some(method), rest.trim())
            }
            None => (None, raw),
        };

        let matcher = if let Some(exact) = pattern.strip_prefix('=') {
            PathMatcher::Exact(exact.to_string())
        } else if let Some(fragment) = pattern.strip_prefix('*') {
            if fragment.is_empty() {
                return Err(RouteParseError::InvalidPattern(raw.to_string()));
            }
            PathMatcher::Contains(fragment.to_string())
        } else if pattern.starts_with('/') {
            PathMatcher::Prefix(pattern.to_string())
        } else {
            return Err(RouteParseError::InvalidPattern(raw.to_string()));
        };

        Ok(Self { method, matcher })
    }
}

impl fmt::Display for RouteRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(method) = &self.method {
            write!(f, "{method} ")?;
        }
        match &self.matcher {
            PathMatcher::Exact(p) => write!(f, "={p}"),
            PathMatcher::Contains(p) => write!(f, "*{p}"),
            PathMatcher::Prefix(p) => f.write_str(p),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

impl RouteTable {
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self { rules }
    }

    pub fn default_public() -> Self {
        let rules = DEFAULT_PUBLIC_ROUTES
            .iter()
            .filter_map(|raw| raw.parse().ok())
            .collect();
        Self { rules }
    }

    pub fn parse(list: &str) -> Result<Self, RouteParseError> {
        let rules = list
            .split(',')
            .filter(|entry| !entry.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// Non-canonical paths never match a public rule.
    pub fn classify(&self, method: &Method, path: &str) -> Classification {
        if !is_canonical(path) {
            return Classification::Protected;
        }
        if self.rules.iter().any(|rule| rule.matches(method, path)) {
            Classification::Public
        } else {
            Classification::Protected
        }
    }
}

/// Absolute, no dot segments (plain or percent-encoded), no empty segments
/// apart from a single trailing slash.
fn is_canonical(path: &str) -> bool {
    let Some(rest) = path.strip_prefix('/') else {
        return false;
    };
    if rest.is_empty() {
        return true;
    }
    let rest = rest.strip_suffix('/').unwrap_or(rest);
    rest.split('/').all(|segment| {
        !segment.is_empty() && !is_dot_segment(segment) && !segment.contains('\\')
    })
}

fn is_dot_segment(segment: &str) -> bool {
    let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
    decoded == "." || decoded == ".."
}
