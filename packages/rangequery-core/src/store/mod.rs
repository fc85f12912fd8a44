//! Store abstraction — the contract every inventory backend implements.
//!
//! See `spec.md` §4.2. `Store` is object-safe and `Send + Sync` so a single
//! backend instance can be shared behind `Arc<dyn Store>` across concurrent
//! request tasks (`spec.md` §5): the engine only ever reads through it.

pub mod file_store;
pub mod kv_store;
pub mod test_store;

pub use file_store::FileStore;
pub use kv_store::{HttpKvTransport, KVStore, KvTransport};
pub use test_store::TestStore;

use crate::error::Result;

/// The reserved key whose value list is the default forward lookup result
/// for a leaf cluster.
pub const NODES_KEY: &str = "NODES";

/// The meta-key that enumerates a leaf's own keys (never includes itself).
pub const KEYS_KEY: &str = "KEYS";

/// Abstract contract for inventory backends.
///
/// All lookups operate on and return ordered sequences of strings; see
/// `spec.md` §4.2 for the full ordering and error contract each method
/// must honor.
pub trait Store: Send + Sync {
    /// Forward lookup: for each input cluster, its `NODES` values if it's
    /// a leaf, or its immediate children (bare names) if it's internal.
    fn cluster_lookup(&self, clusters: &[String]) -> Result<Vec<String>>;

    /// Forward lookup on an explicit key. `key == "KEYS"` returns the
    /// leaf's key set instead of a value list.
    fn key_lookup(&self, clusters: &[String], key: &str) -> Result<Vec<String>>;

    /// Reverse lookup with the default attribute (`NODES`) and no hint.
    fn key_reverse_lookup(&self, value: &str) -> Result<Vec<String>>;

    /// Reverse lookup against an explicit attribute, whole tree.
    fn key_reverse_lookup_attr(&self, value: &str, attr: &str) -> Result<Vec<String>>;

    /// Reverse lookup against an explicit attribute, restricted to the
    /// subtree rooted at `hint` (empty hint = whole tree).
    fn key_reverse_lookup_hint(&self, value: &str, attr: &str, hint: &str) -> Result<Vec<String>>;

    /// Whether reverse lookups stop at the first match. Purely advisory
    /// for callers that want to reason about result cardinality; backends
    /// enforce this internally.
    fn fast_lookup(&self) -> bool;
}
