//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes, bucketed by method
//! - Look up matching route for (method, host, path)
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(1) method lookup via HashMap
//! - O(n) scan within a method bucket (acceptable for typical route counts)
//! - Explicit None rather than silent default

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::routing::matcher::{normalize_host, HostMatcher, PathPattern};
use crate::routing::route::{Route, RouteMatch};

#[derive(Debug)]
struct CompiledRoute {
    route: Route,
    host: HostMatcher,
    path: PathPattern,
}

/// A frozen, fully built matcher over a route set.
#[derive(Debug, Default)]
pub struct Router {
    by_method: HashMap<String, Vec<CompiledRoute>>,
    primary_domain: Option<String>,
}

impl Router {
    /// Compile every route in the table. Routes whose pattern fails to compile
    /// are skipped with a warning; registration rejects them up front, so this
    /// only happens with hand-edited snapshots.
    pub fn build(routes: &BTreeMap<String, BTreeSet<Route>>, primary_domain: Option<String>) -> Self {
        let mut by_method = HashMap::with_capacity(routes.len());

        for (method, bucket) in routes {
            let compiled: Vec<CompiledRoute> = bucket
                .iter()
                .filter_map(|route| match PathPattern::parse(&route.path_pattern) {
                    Ok(path) => Some(CompiledRoute {
                        host: HostMatcher::new(route.host.clone()),
                        path,
                        route: route.clone(),
                    }),
                    Err(e) => {
                        tracing::warn!(error = %e, endpoint = %route.endpoint, "Skipping uncompilable route");
                        None
                    }
                })
                .collect();

            if !compiled.is_empty() {
                by_method.insert(method.clone(), compiled);
            }
        }

        Self {
            by_method,
            primary_domain,
        }
    }

    /// Find the first route in the method's bucket matching host and path.
    pub fn resolve(&self, method: &str, host: &str, path: &str) -> Option<RouteMatch> {
        let bucket = self.by_method.get(method)?;
        let host = normalize_host(host, self.primary_domain.as_deref());

        bucket
            .iter()
            .filter(|c| c.host.matches(&host))
            .find_map(|c| {
                c.path.captures(path).map(|params| RouteMatch {
                    route: c.route.clone(),
                    params,
                })
            })
    }

    /// Number of compiled routes across all methods.
    pub fn len(&self) -> usize {
        self.by_method.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_method.is_empty()
    }
}
