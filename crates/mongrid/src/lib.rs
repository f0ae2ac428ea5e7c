//! mongrid: per-endpoint MongoDB connection registry.
//!
//! Guarantees that at most one connection pool exists per `host:port`, even
//! when many tasks ask for it at the same moment, and exposes a small set of
//! deadline-bounded passthrough operations on that pool.
//!
//! # Architecture
//!
//! ```text
//! caller → ConnectionRegistry::acquire(config)
//!   → Ready entry for host:port      → return cached Handle
//!   → Initializing (another caller)  → wait, share its outcome
//!   → Uninitialized / Failed         → spawn initializer
//!       → Connector::connect (bounded) → Connector::ping (bounded)
//!       → publish Handle, wake waiters
//!
//! caller → ConnectionRegistry::release(host, port)
//!   → drop entry, disconnect pool (best effort), next acquire re-initializes
//! ```
//!
//! The registry is an ordinary value owned by the application; nothing here
//! is process-global.

pub mod classify;
pub mod connector;
pub mod error;
pub mod handle;
pub mod query;
pub mod registry;

pub use classify::{is_duplicate_key, is_no_document, object_id_hex, strings_from_array};
pub use connector::{ConnectOptions, Connector, MongoConnector};
pub use error::{PoolError, PoolResult};
pub use handle::Handle;
pub use mongrid_core::{MongoConfig, PoolKey};
pub use query::{FieldFilter, MatchMode, MembershipGroup, SearchQuery, SortDirection, SortKey};
pub use registry::{ConnectionRegistry, KeyState};

/// Re-exported driver crate, so callers build filters and documents with the
/// same `bson` version this crate was compiled against.
pub use mongodb;
