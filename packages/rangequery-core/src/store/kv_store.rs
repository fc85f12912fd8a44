//! Hierarchical distributed-KV backend with an optional reverse-index
//! fast path. See `spec.md` §4.4.
//!
//! The evaluator-facing `KVStore` is transport-agnostic: it talks to
//! the backend through the small [`KvTransport`] trait rather than
//! embedding an etcd client directly, the way `FileStore` talks to the
//! OS filesystem through `std::fs`. [`HttpKvTransport`] is the one
//! transport shipped here, grounded in the original's etcd v2 HTTP API
//! (`GET /v2/keys/<path>?recursive=true`).

use std::sync::RwLock;

use serde::Deserialize;
use tracing::{debug, trace, warn};

use crate::error::{RangeError, Result};
use crate::store::{Store, KEYS_KEY, NODES_KEY};

const LEAF_SENTINEL: &str = "_leaf";
const READY_SENTINEL: &str = "_range_store";
const READY_VALUE: &str = "loaded";
const ROPTIMIZE_PREFIX: &str = "_roptimize";

/// Reserved key basenames that are bookkeeping, never real tree nodes,
/// and must never leak into a `children`/forward-lookup listing.
fn is_reserved_name(name: &str) -> bool {
    matches!(name, LEAF_SENTINEL | READY_SENTINEL | ROPTIMIZE_PREFIX)
}

/// A single node in the KV tree, mirroring etcd v2's `node` shape
/// closely enough to stay transport-agnostic: a value (if this is a
/// leaf key-entry), whether it's a directory, and its immediate or
/// recursively-fetched children.
#[derive(Debug, Clone)]
pub struct KvNode {
    pub key: String,
    pub value: Option<String>,
    pub dir: bool,
    pub nodes: Vec<KvNode>,
}

impl KvNode {
    fn basename(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// Abstract KV transport. `KVStore` is generic over this so the
/// evaluator-facing backend stays synchronous and swappable, the same
/// role `Store` itself plays for the evaluator.
pub trait KvTransport: Send + Sync {
    /// Fetch `key`. `recursive` requests the whole subtree in one
    /// round-trip (used for reverse-lookup tree walks); `Ok(None)`
    /// means "key not found", distinct from a transport error.
    fn get(&self, key: &str, recursive: bool) -> Result<Option<KvNode>>;
}

/// etcd v2 HTTP transport (`reqwest` blocking client).
pub struct HttpKvTransport {
    endpoints: Vec<String>,
    client: reqwest::blocking::Client,
}

impl HttpKvTransport {
    pub fn new(endpoints: Vec<String>) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(RangeError::Backend("KVStore requires at least one endpoint".to_string()));
        }
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| RangeError::Backend(e.to_string()))?;
        Ok(HttpKvTransport { endpoints, client })
    }
}

#[derive(Deserialize)]
struct EtcdResponse {
    node: EtcdNode,
}

#[derive(Deserialize)]
struct EtcdNode {
    key: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    dir: bool,
    #[serde(default)]
    nodes: Vec<EtcdNode>,
}

impl From<EtcdNode> for KvNode {
    fn from(n: EtcdNode) -> Self {
        KvNode {
            key: n.key,
            value: n.value,
            dir: n.dir,
            nodes: n.nodes.into_iter().map(KvNode::from).collect(),
        }
    }
}

impl KvTransport for HttpKvTransport {
    fn get(&self, key: &str, recursive: bool) -> Result<Option<KvNode>> {
        let mut last_err = None;
        for endpoint in &self.endpoints {
            let url = format!(
                "{}/v2/keys{}?recursive={}",
                endpoint.trim_end_matches('/'),
                key,
                recursive
            );
            match self.client.get(&url).send() {
                Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => return Ok(None),
                Ok(resp) if resp.status().is_success() => {
                    let body: EtcdResponse = resp.json().map_err(|e| RangeError::Backend(e.to_string()))?;
                    return Ok(Some(body.node.into()));
                }
                Ok(resp) => {
                    last_err = Some(RangeError::Backend(format!(
                        "{endpoint}: unexpected status {}",
                        resp.status()
                    )));
                }
                Err(e) => {
                    warn!(endpoint, error = %e, "KV endpoint unreachable, trying next");
                    last_err = Some(RangeError::Backend(e.to_string()));
                }
            }
        }
        Err(last_err.unwrap_or_else(|| RangeError::Backend("no KV endpoints configured".to_string())))
    }
}

/// Hierarchical distributed-KV backend.
pub struct KVStore {
    transport: Box<dyn KvTransport>,
    root_prefix: String,
    reverse_optimize: bool,
    fast: bool,
    /// Cached readiness from the connect-time handshake; `is_ready()`
    /// re-queries the backend rather than trusting this forever.
    ready_at_connect: RwLock<bool>,
}

impl KVStore {
    /// Perform the connect-time handshake (`spec.md` §4.4): fetch the
    /// `_range_store` sentinel; absent is fatal ("not loaded"), present
    /// with a value other than `loaded` is fatal ("not ready").
    pub fn connect(
        transport: Box<dyn KvTransport>,
        root_prefix: impl Into<String>,
        reverse_optimize: bool,
        fast_lookup: bool,
    ) -> Result<Self> {
        let root_prefix = root_prefix.into().trim_end_matches('/').to_string();
        let sentinel_key = format!("{root_prefix}/{READY_SENTINEL}");
        match transport.get(&sentinel_key, false)? {
            None => Err(RangeError::Backend(format!(
                "etcd-store is NOT LOADED with data [key: {sentinel_key}]"
            ))),
            Some(node) if node.value.as_deref() != Some(READY_VALUE) => Err(RangeError::Backend(format!(
                "etcd-store is NOT READY to serve [key: {sentinel_key}, value: {:?}]",
                node.value
            ))),
            Some(_) => {
                debug!(root_prefix, reverse_optimize, fast_lookup, "connected to KVStore");
                Ok(KVStore {
                    transport,
                    root_prefix,
                    reverse_optimize,
                    fast: fast_lookup,
                    ready_at_connect: RwLock::new(true),
                })
            }
        }
    }

    /// Live readiness check for a `/healthz`-style endpoint.
    pub fn is_ready(&self) -> bool {
        let live = matches!(
            self.transport.get(&format!("{}/{READY_SENTINEL}", self.root_prefix), false),
            Ok(Some(node)) if node.value.as_deref() == Some(READY_VALUE)
        );
        *self.ready_at_connect.write().unwrap() = live;
        live
    }

    /// `true` for the literal root token `spec.md` §4.2 reserves
    /// (`%RANGE`), matching `test_store.rs`'s `resolve_root`.
    fn is_range_literal(cluster: &str) -> bool {
        cluster.eq_ignore_ascii_case("RANGE")
    }

    fn cluster_path(&self, cluster: &str) -> String {
        if cluster.is_empty() || Self::is_range_literal(cluster) {
            return self.root_prefix.clone();
        }
        format!("{}/{}", self.root_prefix, cluster.replace('-', "/"))
    }

    fn is_leaf(&self, path: &str) -> Result<bool> {
        Ok(self.transport.get(&format!("{path}/{LEAF_SENTINEL}"), false)?.is_some())
    }

    fn leaf_values(&self, cluster: &str, path: &str, key: &str) -> Result<Vec<String>> {
        match self.transport.get(&format!("{path}/{key}"), false)? {
            Some(node) => Ok(node
                .value
                .unwrap_or_default()
                .split('\t')
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect()),
            None => Err(RangeError::KeyNotFound {
                cluster: cluster.to_string(),
                key: key.to_string(),
            }),
        }
    }

    fn leaf_keys(&self, path: &str) -> Result<Vec<String>> {
        let node = self
            .transport
            .get(path, false)?
            .ok_or_else(|| RangeError::Backend(format!("leaf vanished: {path}")))?;
        let mut keys: Vec<String> = node
            .nodes
            .iter()
            .map(|n| n.basename().to_string())
            .filter(|n| !is_reserved_name(n))
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn children(&self, path: &str) -> Result<Vec<String>> {
        let node = self.transport.get(path, false)?;
        match node {
            Some(n) if n.dir => {
                let mut names: Vec<String> = n
                    .nodes
                    .iter()
                    .map(|c| c.basename().to_string())
                    .filter(|name| !is_reserved_name(name))
                    .collect();
                names.sort();
                Ok(names)
            }
            Some(_) => Err(RangeError::Backend(format!("expected {path} to be a directory"))),
            None => Err(RangeError::ClusterNotFound(path.to_string())),
        }
    }

    /// Walk every leaf cluster name under `root_cluster` (`""` = whole
    /// tree rooted at `root_prefix`), using one recursive fetch.
    fn walk_leaves(&self, root_cluster: &str) -> Result<Vec<String>> {
        let path = if root_cluster.is_empty() {
            self.root_prefix.clone()
        } else {
            self.cluster_path(root_cluster)
        };
        let root = self
            .transport
            .get(&path, true)?
            .ok_or_else(|| RangeError::ClusterNotFound(root_cluster.to_string()))?;
        let mut out = Vec::new();
        walk_node(root_cluster, &root, &mut out);
        Ok(out)
    }
}

fn walk_node(cluster: &str, node: &KvNode, out: &mut Vec<String>) {
    if node.nodes.iter().any(|c| c.basename() == LEAF_SENTINEL) {
        out.push(cluster.to_string());
        return;
    }
    for child in &node.nodes {
        let name = child.basename();
        let child_cluster = if cluster.is_empty() {
            name.to_string()
        } else {
            format!("{cluster}-{name}")
        };
        walk_node(&child_cluster, child, out);
    }
}

impl Store for KVStore {
    fn cluster_lookup(&self, clusters: &[String]) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for cluster in clusters {
            let path = self.cluster_path(cluster);
            if self.is_leaf(&path)? {
                out.extend(self.leaf_values(cluster, &path, NODES_KEY)?);
            } else {
                out.extend(self.children(&path)?);
            }
        }
        crate::setops::dedup(&mut out);
        Ok(out)
    }

    fn key_lookup(&self, clusters: &[String], key: &str) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for cluster in clusters {
            let path = self.cluster_path(cluster);
            if !self.is_leaf(&path)? {
                return Err(RangeError::NotALeaf(cluster.clone(), key.to_string()));
            }
            if key == KEYS_KEY {
                out.extend(self.leaf_keys(&path)?);
            } else {
                out.extend(self.leaf_values(cluster, &path, key)?);
            }
        }
        crate::setops::dedup(&mut out);
        Ok(out)
    }

    fn key_reverse_lookup(&self, value: &str) -> Result<Vec<String>> {
        self.key_reverse_lookup_attr(value, NODES_KEY)
    }

    fn key_reverse_lookup_attr(&self, value: &str, attr: &str) -> Result<Vec<String>> {
        self.key_reverse_lookup_hint(value, attr, "")
    }

    fn key_reverse_lookup_hint(&self, value: &str, attr: &str, hint: &str) -> Result<Vec<String>> {
        // The reverse-optimize fast path only ever applies to the
        // default NODES attribute with no hint (spec.md §9.4 — hints
        // are ignored when the fast path fires, a documented caveat
        // inherited from the original).
        if self.reverse_optimize && attr == NODES_KEY && hint.is_empty() {
            trace!(value, "KVStore reverse lookup via _roptimize index");
            let key = format!("{}/{ROPTIMIZE_PREFIX}/{value}", self.root_prefix);
            let mut leaves: Vec<String> = match self.transport.get(&key, false)? {
                Some(node) => node
                    .value
                    .unwrap_or_default()
                    .split('\t')
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string())
                    .collect(),
                None => Vec::new(),
            };
            if self.fast {
                leaves.truncate(1);
            }
            return Ok(leaves);
        }

        trace!(value, attr, hint, "KVStore reverse lookup (full tree walk)");
        let mut out = Vec::new();
        for leaf in self.walk_leaves(hint)? {
            let path = self.cluster_path(&leaf);
            if let Ok(values) = self.leaf_values(&leaf, &path, attr) {
                if values.iter().any(|v| v == value) {
                    out.push(leaf);
                    if self.fast {
                        break;
                    }
                }
            }
        }
        Ok(out)
    }

    fn fast_lookup(&self) -> bool {
        self.fast
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory transport fixture, keyed exactly like the real etcd
    /// layout, for testing `KVStore`'s logic without a network.
    struct FakeTransport {
        entries: Mutex<HashMap<String, KvNode>>,
    }

    impl FakeTransport {
        fn new() -> Self {
            FakeTransport {
                entries: Mutex::new(HashMap::new()),
            }
        }

        fn put(&mut self, key: &str, value: Option<&str>, dir: bool) {
            self.entries.lock().unwrap().insert(
                key.to_string(),
                KvNode {
                    key: key.to_string(),
                    value: value.map(|s| s.to_string()),
                    dir,
                    nodes: Vec::new(),
                },
            );
        }
    }

    impl KvTransport for FakeTransport {
        fn get(&self, key: &str, recursive: bool) -> Result<Option<KvNode>> {
            let entries = self.entries.lock().unwrap();
            let Some(base) = entries.get(key) else {
                return Ok(None);
            };
            if !base.dir {
                return Ok(Some(base.clone()));
            }
            let depth = if recursive { usize::MAX } else { 1 };
            let mut node = base.clone();
            node.nodes = direct_children(&entries, key, depth);
            Ok(Some(node))
        }
    }

    fn direct_children(entries: &HashMap<String, KvNode>, prefix: &str, depth: usize) -> Vec<KvNode> {
        let mut out = Vec::new();
        for (k, v) in entries.iter() {
            if let Some(rest) = k.strip_prefix(&format!("{prefix}/")) {
                if !rest.contains('/') {
                    let mut child = v.clone();
                    if child.dir && depth > 1 {
                        child.nodes = direct_children(entries, k, depth - 1);
                    }
                    out.push(child);
                }
            }
        }
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    fn fixture() -> KVStore {
        let mut t = FakeTransport::new();
        t.put("/range", None, true);
        t.put("/range/_range_store", Some("loaded"), false);
        t.put("/range/ops", None, true);
        t.put("/range/ops/prod", None, true);
        t.put("/range/ops/prod/vpc1", None, true);
        t.put("/range/ops/prod/vpc1/range", None, true);
        t.put("/range/ops/prod/vpc1/range/_leaf", Some(""), false);
        t.put(
            "/range/ops/prod/vpc1/range/NODES",
            Some("range1001.ops.example.com\trange1002.ops.example.com"),
            false,
        );
        t.put("/range/ops/prod/vpc1/range/AUTHORS", Some("Vigith Maurice"), false);
        KVStore::connect(Box::new(t), "/range", false, false).unwrap()
    }

    #[test]
    fn connect_requires_loaded_sentinel() {
        let mut t = FakeTransport::new();
        t.put("/range", None, true);
        assert!(KVStore::connect(Box::new(t), "/range", false, false).is_err());

        let mut t = FakeTransport::new();
        t.put("/range", None, true);
        t.put("/range/_range_store", Some("loading"), false);
        assert!(KVStore::connect(Box::new(t), "/range", false, false).is_err());
    }

    #[test]
    fn cluster_lookup_leaf_reads_tab_joined_nodes() {
        let store = fixture();
        let got = store.cluster_lookup(&["ops-prod-vpc1-range".to_string()]).unwrap();
        assert_eq!(
            got,
            vec![
                "range1001.ops.example.com".to_string(),
                "range1002.ops.example.com".to_string(),
            ]
        );
    }

    #[test]
    fn cluster_lookup_internal_lists_children_excluding_leaf_sentinel() {
        let store = fixture();
        let got = store.cluster_lookup(&["ops-prod".to_string()]).unwrap();
        assert_eq!(got, vec!["vpc1".to_string()]);
    }

    #[test]
    fn cluster_lookup_range_literal_resolves_to_store_root() {
        let store = fixture();
        let got = store.cluster_lookup(&["RANGE".to_string()]).unwrap();
        assert_eq!(got, vec!["ops".to_string()]);

        let got = store.cluster_lookup(&["range".to_string()]).unwrap();
        assert_eq!(got, vec!["ops".to_string()]);
    }

    #[test]
    fn key_lookup_named_attribute() {
        let store = fixture();
        let got = store
            .key_lookup(&["ops-prod-vpc1-range".to_string()], "AUTHORS")
            .unwrap();
        assert_eq!(got, vec!["Vigith Maurice".to_string()]);
    }

    #[test]
    fn key_lookup_keys_excludes_leaf_sentinel() {
        let store = fixture();
        let got = store
            .key_lookup(&["ops-prod-vpc1-range".to_string()], KEYS_KEY)
            .unwrap();
        assert_eq!(got, vec!["AUTHORS".to_string(), "NODES".to_string()]);
    }

    #[test]
    fn is_ready_reflects_live_sentinel() {
        let store = fixture();
        assert!(store.is_ready());
    }

    fn roptimize_fixture(fast: bool) -> KVStore {
        let mut t = FakeTransport::new();
        t.put("/range", None, true);
        t.put("/range/_range_store", Some("loaded"), false);
        t.put(
            "/range/_roptimize/Ops",
            Some("ops-prod-vpc1-mon\tops-prod-vpc2-mon"),
            false,
        );
        KVStore::connect(Box::new(t), "/range", true, fast).unwrap()
    }

    #[test]
    fn reverse_optimize_path_returns_full_index_entry_when_not_fast() {
        let store = roptimize_fixture(false);
        let got = store.key_reverse_lookup_attr("Ops", NODES_KEY).unwrap();
        assert_eq!(
            got,
            vec!["ops-prod-vpc1-mon".to_string(), "ops-prod-vpc2-mon".to_string()]
        );
    }

    #[test]
    fn reverse_optimize_path_respects_fast_lookup_truncation() {
        // Regression: the _roptimize fast path used to ignore `self.fast`
        // entirely, returning the whole index entry even when fast-lookup
        // idempotence (spec.md §8: result length <= 1) was requested.
        let store = roptimize_fixture(true);
        let got = store.key_reverse_lookup_attr("Ops", NODES_KEY).unwrap();
        assert_eq!(got, vec!["ops-prod-vpc1-mon".to_string()]);
    }
}
