//! Route values.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

/// A (host, method, path-pattern) → endpoint binding.
///
/// Routes are plain values: two routes are the same route when every field is
/// equal, which is what gives registration its set semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Route {
    /// Host label the route answers for, lowercase, primary domain excluded.
    pub host: String,
    /// Uppercased HTTP method.
    pub method: String,
    /// Path pattern, e.g. `/users/:id`.
    #[serde(rename = "path")]
    pub path_pattern: String,
    /// Backend endpoint the event is POSTed to.
    pub endpoint: Url,
}

impl Route {
    /// Build a route, normalizing method to uppercase and host to lowercase.
    pub fn new(
        host: impl AsRef<str>,
        method: impl AsRef<str>,
        path_pattern: impl Into<String>,
        endpoint: Url,
    ) -> Self {
        Self {
            host: host.as_ref().trim().to_lowercase(),
            method: method.as_ref().trim().to_uppercase(),
            path_pattern: path_pattern.into(),
            endpoint,
        }
    }
}

/// Result of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub route: Route,
    /// Named path parameters, percent-decoded.
    pub params: HashMap<String, String>,
}

impl RouteMatch {
    pub fn endpoint(&self) -> &Url {
        &self.route.endpoint
    }
}
