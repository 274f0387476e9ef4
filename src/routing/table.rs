//! The live route table.
//!
//! Mutations (register/unregister) are serialized through an async mutex and
//! each one rebuilds the whole [`Router`] from the current route set, persists
//! the snapshot, and swaps the new router in with a single atomic store.
//! Lookups only ever `load()` the current router, so a request sees either the
//! complete old matcher or the complete new one.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;

use crate::config::RoutingConfig;
use crate::observability::metrics;
use crate::routing::matcher::{PathPattern, PatternError};
use crate::routing::route::{Route, RouteMatch};
use crate::routing::router::Router;
use crate::routing::snapshot::SnapshotStore;

type RouteSet = BTreeMap<String, BTreeSet<Route>>;

/// Errors surfaced by route table mutations.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("route not found: {method} {host}{path} -> {endpoint}")]
    RouteNotFound {
        host: String,
        method: String,
        path: String,
        endpoint: String,
    },
    #[error("invalid route pattern: {0}")]
    InvalidPattern(#[from] PatternError),
    /// The in-memory table was updated but the snapshot could not be written.
    #[error("failed to persist route snapshot: {0}")]
    Persist(#[source] std::io::Error),
}

/// Registered routes plus the compiled matcher serving lookups.
pub struct RouteTable {
    routes: Mutex<RouteSet>,
    router: ArcSwap<Router>,
    snapshot: Option<SnapshotStore>,
    primary_domain: Option<String>,
}

impl RouteTable {
    /// Open the table described by the routing config, restoring the snapshot.
    pub fn open(config: &RoutingConfig) -> Self {
        let store = SnapshotStore::new(&config.snapshot_path);
        let restored = store.load();
        Self::with_routes(restored, Some(store), config.primary_domain.clone())
    }

    /// A table that is never persisted.
    pub fn in_memory(primary_domain: Option<String>) -> Self {
        Self::with_routes(Vec::new(), None, primary_domain)
    }

    fn with_routes(
        routes: Vec<Route>,
        snapshot: Option<SnapshotStore>,
        primary_domain: Option<String>,
    ) -> Self {
        let mut set = RouteSet::new();
        for route in routes {
            set.entry(route.method.clone()).or_default().insert(route);
        }
        let router = Router::build(&set, primary_domain.clone());
        metrics::record_route_count(router.len());

        Self {
            routes: Mutex::new(set),
            router: ArcSwap::from_pointee(router),
            snapshot,
            primary_domain,
        }
    }

    /// Add a route. Registering an identical route again is a no-op apart
    /// from the rebuild. Returns whether the route was newly added.
    pub async fn register(&self, route: Route) -> Result<bool, RouteError> {
        PathPattern::parse(&route.path_pattern)?;

        let mut routes = self.routes.lock().await;
        let added = routes.entry(route.method.clone()).or_default().insert(route.clone());

        tracing::info!(
            method = %route.method,
            host = %route.host,
            path = %route.path_pattern,
            endpoint = %route.endpoint,
            added,
            "Route registered"
        );

        self.commit(&routes).await?;
        Ok(added)
    }

    /// Remove a route.
    ///
    /// An absent route yields `RouteNotFound`, but the table is still rebuilt
    /// and persisted so the snapshot always reflects the live table.
    pub async fn unregister(&self, route: &Route) -> Result<(), RouteError> {
        let mut routes = self.routes.lock().await;

        let removed = match routes.get_mut(&route.method) {
            Some(bucket) => {
                let removed = bucket.remove(route);
                if bucket.is_empty() {
                    routes.remove(&route.method);
                }
                removed
            }
            None => false,
        };

        let committed = self.commit(&routes).await;

        if !removed {
            if let Err(e) = committed {
                tracing::error!(error = %e, "Snapshot write failed during unregister of unknown route");
            }
            return Err(RouteError::RouteNotFound {
                host: route.host.clone(),
                method: route.method.clone(),
                path: route.path_pattern.clone(),
                endpoint: route.endpoint.to_string(),
            });
        }

        tracing::info!(
            method = %route.method,
            host = %route.host,
            path = %route.path_pattern,
            endpoint = %route.endpoint,
            "Route unregistered"
        );
        committed
    }

    /// Rebuild the matcher, swap it in, and persist. The swap happens before
    /// the snapshot write so lookups follow the in-memory table even when the
    /// disk is unavailable.
    async fn commit(&self, routes: &RouteSet) -> Result<(), RouteError> {
        let router = Router::build(routes, self.primary_domain.clone());
        metrics::record_route_count(router.len());
        self.router.store(Arc::new(router));

        if let Some(store) = &self.snapshot {
            let flat: Vec<Route> = routes.values().flatten().cloned().collect();
            store.save(&flat).await.map_err(|e| {
                tracing::error!(path = %store.path().display(), error = %e, "Failed to persist route snapshot");
                RouteError::Persist(e)
            })?;
        }
        Ok(())
    }

    /// Resolve a request against the current matcher.
    pub fn resolve(&self, method: &str, host: &str, path: &str) -> Option<RouteMatch> {
        self.router.load().resolve(method, host, path)
    }

    /// All registered routes, ordered by method then route.
    pub async fn routes(&self) -> Vec<Route> {
        self.routes.lock().await.values().flatten().cloned().collect()
    }

    /// Number of routes in the serving matcher.
    pub fn len(&self) -> usize {
        self.router.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.router.load().is_empty()
    }
}
