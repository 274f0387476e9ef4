//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, host, path)
//!     → table.rs (load current Router, lock-free)
//!     → router.rs (method bucket lookup)
//!     → matcher.rs (host normalization, path pattern captures)
//!     → Return: RouteMatch (route + path params) or None
//!
//! Control plane (register / unregister):
//!     → table.rs (mutate route set under lock)
//!     → router.rs (rebuild whole Router from the set)
//!     → atomic swap of Arc<Router>
//!     → snapshot.rs (persist full set, temp file + rename)
//! ```
//!
//! # Design Decisions
//! - Routers are immutable; every mutation builds a fresh one
//! - Snapshot restored once at startup, rewritten after every mutation
//! - Overlapping patterns are a caller error; no precedence rule between them

pub mod matcher;
pub mod route;
pub mod router;
pub mod snapshot;
pub mod table;

pub use route::{Route, RouteMatch};
pub use router::Router;
pub use table::{RouteError, RouteTable};
