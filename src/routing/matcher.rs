//! Host and path matching logic.
//!
//! # Responsibilities
//! - Normalize the request host (strip port and primary-domain suffix)
//! - Match the normalized host (exact match, case-insensitive)
//! - Match path patterns with named parameters (`/users/:id`) and a
//!   trailing catch-all (`/files/*rest`)
//!
//! # Design Decisions
//! - Host matching is case-insensitive
//! - Path matching is case-sensitive, segment by segment
//! - Trailing slashes are significant: `/a/` does not match `/a`
//! - No regex to guarantee O(segments) matching

use std::collections::{HashMap, HashSet};

/// Error raised when a path pattern cannot be compiled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("path pattern must start with '/': {0}")]
    MissingLeadingSlash(String),
    #[error("empty parameter name in pattern: {0}")]
    EmptyParam(String),
    #[error("duplicate parameter '{name}' in pattern: {pattern}")]
    DuplicateParam { name: String, pattern: String },
    #[error("catch-all must be the last segment: {0}")]
    CatchAllNotLast(String),
}

/// Strip the port and the configured primary-domain suffix from a Host value.
///
/// `api.example.com:8080` with primary domain `example.com` becomes `api`;
/// the bare primary domain becomes the empty label. Hosts outside the
/// primary domain are returned lowercased and otherwise untouched.
pub fn normalize_host(raw: &str, primary_domain: Option<&str>) -> String {
    let host = strip_port(raw.trim()).to_lowercase();
    let Some(domain) = primary_domain else {
        return host;
    };
    let domain = domain.trim_start_matches('.').to_lowercase();
    if host == domain {
        return String::new();
    }
    match host.strip_suffix(domain.as_str()) {
        Some(prefix) if prefix.ends_with('.') => prefix.trim_end_matches('.').to_string(),
        _ => host,
    }
}

fn strip_port(host: &str) -> &str {
    // IPv6 literals keep their brackets: [::1]:8080 → [::1]
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Matches an already-normalized host.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    expected_host: String,
}

impl HostMatcher {
    /// Create a new host matcher.
    /// The host is normalized to lowercase for case-insensitive matching.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            expected_host: host.into().to_lowercase(),
        }
    }

    pub fn matches(&self, normalized_host: &str) -> bool {
        self.expected_host == normalized_host
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    CatchAll(String),
}

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compile a pattern such as `/users/:id` or `/static/*path`.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let rest = pattern
            .strip_prefix('/')
            .ok_or_else(|| PatternError::MissingLeadingSlash(pattern.to_string()))?;

        let raw: Vec<&str> = rest.split('/').collect();
        let mut segments = Vec::with_capacity(raw.len());
        let mut seen = HashSet::new();

        for (i, part) in raw.iter().enumerate() {
            let segment = if let Some(name) = part.strip_prefix(':') {
                Segment::Param(name.to_string())
            } else if let Some(name) = part.strip_prefix('*') {
                if i + 1 != raw.len() {
                    return Err(PatternError::CatchAllNotLast(pattern.to_string()));
                }
                Segment::CatchAll(name.to_string())
            } else {
                Segment::Literal(part.to_string())
            };

            if let Segment::Param(name) | Segment::CatchAll(name) = &segment {
                if name.is_empty() {
                    return Err(PatternError::EmptyParam(pattern.to_string()));
                }
                if !seen.insert(name.clone()) {
                    return Err(PatternError::DuplicateParam {
                        name: name.clone(),
                        pattern: pattern.to_string(),
                    });
                }
            }
            segments.push(segment);
        }

        Ok(Self { segments })
    }

    /// Match a request path, returning the decoded parameters on success.
    ///
    /// Parameters that do not percent-decode to valid UTF-8 make the match fail.
    pub fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let rest = path.strip_prefix('/')?;
        let parts: Vec<&str> = rest.split('/').collect();
        let mut params = HashMap::new();

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(lit) => {
                    if parts.get(i) != Some(&lit.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = parts.get(i).filter(|p| !p.is_empty())?;
                    params.insert(name.clone(), decode(value)?);
                }
                Segment::CatchAll(name) => {
                    let tail = parts.get(i..).map(|t| t.join("/")).unwrap_or_default();
                    params.insert(name.clone(), decode(&tail)?);
                    return Some(params);
                }
            }
        }

        (parts.len() == self.segments.len()).then_some(params)
    }
}

fn decode(raw: &str) -> Option<String> {
    urlencoding::decode(raw).ok().map(|s| s.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_host() {
        let domain = Some("example.com");
        assert_eq!(normalize_host("api.example.com", domain), "api");
        assert_eq!(normalize_host("API.Example.com:8080", domain), "api");
        assert_eq!(normalize_host("a.b.example.com", domain), "a.b");
        assert_eq!(normalize_host("example.com", domain), "");
        assert_eq!(normalize_host("notexample.com", domain), "notexample.com");
        assert_eq!(normalize_host("other.org", domain), "other.org");
        assert_eq!(normalize_host("localhost:8888", None), "localhost");
        assert_eq!(normalize_host("[::1]:8888", None), "[::1]");
    }

    #[test]
    fn test_host_matcher() {
        let matcher = HostMatcher::new("API");
        assert!(matcher.matches("api"));
        assert!(!matcher.matches("other"));
    }

    #[test]
    fn test_literal_pattern() {
        let pattern = PathPattern::parse("/api/v1").unwrap();
        assert!(pattern.captures("/api/v1").is_some());
        assert!(pattern.captures("/api/v1/").is_none());
        assert!(pattern.captures("/api").is_none());
        assert!(pattern.captures("/API/v1").is_none());

        let root = PathPattern::parse("/").unwrap();
        assert!(root.captures("/").is_some());
        assert!(root.captures("/x").is_none());
    }

    #[test]
    fn test_named_params_are_decoded() {
        let pattern = PathPattern::parse("/users/:id/posts/:slug").unwrap();
        let params = pattern.captures("/users/42/posts/hello%20w%C3%B6rld").unwrap();
        assert_eq!(params["id"], "42");
        assert_eq!(params["slug"], "hello wörld");

        assert!(pattern.captures("/users//posts/x").is_none());
        assert!(pattern.captures("/users/42/posts").is_none());
    }

    #[test]
    fn test_invalid_utf8_param_does_not_match() {
        let pattern = PathPattern::parse("/users/:id").unwrap();
        assert!(pattern.captures("/users/%FF").is_none());
    }

    #[test]
    fn test_catch_all() {
        let pattern = PathPattern::parse("/static/*path").unwrap();
        assert_eq!(pattern.captures("/static/css/site.css").unwrap()["path"], "css/site.css");
        assert_eq!(pattern.captures("/static").unwrap()["path"], "");
        assert!(pattern.captures("/other/x").is_none());
    }

    #[test]
    fn test_pattern_errors() {
        assert!(matches!(PathPattern::parse("users"), Err(PatternError::MissingLeadingSlash(_))));
        assert!(matches!(PathPattern::parse("/users/:"), Err(PatternError::EmptyParam(_))));
        assert!(matches!(PathPattern::parse("/*a/b"), Err(PatternError::CatchAllNotLast(_))));
        assert!(matches!(
            PathPattern::parse("/:id/:id"),
            Err(PatternError::DuplicateParam { .. })
        ));
    }
}
