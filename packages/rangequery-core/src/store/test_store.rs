//! In-memory fixture backend, for unit tests and interactive experiments.
//!
//! The tree shape and leaf contents here are fixed: they reproduce the
//! inventory the worked examples in `spec.md` §8 are evaluated against.

use std::collections::HashMap;

use crate::error::{RangeError, Result};
use crate::store::{Store, KEYS_KEY, NODES_KEY};

/// A leaf cluster's attribute table. `NODES` is always present; other
/// keys vary (`AUTHORS`, `QAFOR`, ...).
#[derive(Debug, Clone, Default)]
struct Leaf {
    attrs: HashMap<String, Vec<String>>,
}

impl Leaf {
    fn new(nodes: &[&str]) -> Self {
        let mut attrs = HashMap::new();
        attrs.insert(NODES_KEY.to_string(), strs(nodes));
        Leaf { attrs }
    }

    fn with(mut self, key: &str, values: &[&str]) -> Self {
        self.attrs.insert(key.to_string(), strs(values));
        self
    }
}

fn strs(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// A fixed, hand-built inventory tree, in the shape of the original
/// project's own FileStore test fixture (ops/data clusters, vpc subtrees).
pub struct TestStore {
    /// Bare-segment children of a cluster, keyed by full cluster name.
    /// The root's children are keyed under the empty string.
    children: HashMap<String, Vec<String>>,
    leaves: HashMap<String, Leaf>,
    fast: bool,
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TestStore {
    pub fn new() -> Self {
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        let mut leaves: HashMap<String, Leaf> = HashMap::new();

        children.insert(String::new(), strs(&["ops", "data"]));
        children.insert("ops".into(), strs(&["ops-prod"]));
        children.insert("ops-prod".into(), strs(&["ops-prod-vpc1", "ops-prod-vpc2"]));
        children.insert(
            "ops-prod-vpc1".into(),
            strs(&["ops-prod-vpc1-range", "ops-prod-vpc1-mon"]),
        );
        children.insert("ops-prod-vpc2".into(), strs(&["ops-prod-vpc2-mon"]));

        children.insert("data".into(), strs(&["data-prod", "data-qa"]));
        children.insert(
            "data-prod".into(),
            strs(&["data-prod-vpc1", "data-prod-vpc2", "data-prod-vpc3"]),
        );
        children.insert("data-prod-vpc1".into(), strs(&["data-prod-vpc1-log"]));
        children.insert("data-prod-vpc2".into(), strs(&["data-prod-vpc2-log"]));
        children.insert("data-prod-vpc3".into(), strs(&["data-prod-vpc3-log"]));
        children.insert("data-qa".into(), strs(&["data-qa-vpc5"]));
        children.insert("data-qa-vpc5".into(), strs(&["data-qa-vpc5-log"]));

        leaves.insert(
            "ops-prod-vpc1-range".into(),
            Leaf::new(&[
                "range1001.ops.example.com",
                "range1002.ops.example.com",
                "range1003.ops.example.com",
            ])
            .with("AUTHORS", &["Vigith Maurice"]),
        );
        leaves.insert(
            "ops-prod-vpc1-mon".into(),
            Leaf::new(&["mon1001.ops.example.com"]).with("AUTHORS", &["Ops", "Vigith Maurice"]),
        );
        leaves.insert(
            "ops-prod-vpc2-mon".into(),
            Leaf::new(&["mon2001.ops.example.com"]).with("AUTHORS", &["Ops"]),
        );
        leaves.insert(
            "data-prod-vpc1-log".into(),
            Leaf::new(&["log1001.data.example.com"]).with("AUTHORS", &["data@example.com"]),
        );
        leaves.insert(
            "data-prod-vpc2-log".into(),
            Leaf::new(&["log2001.data.example.com"]).with("AUTHORS", &["data@example.com"]),
        );
        leaves.insert(
            "data-prod-vpc3-log".into(),
            Leaf::new(&["log3001.data.example.com"]).with("AUTHORS", &["data@example.com"]),
        );
        leaves.insert(
            "data-qa-vpc5-log".into(),
            Leaf::new(&["log5001.data.example.com"]).with("QAFOR", &["data"]),
        );

        TestStore {
            children,
            leaves,
            fast: true,
        }
    }

    /// `true` if `cluster` names a known internal (non-leaf) node.
    /// Override the `fast_lookup` flag after construction — handy for
    /// tests that want to compare fast vs. whole-tree cardinality
    /// against the same fixture.
    pub fn set_fast_lookup(&mut self, fast: bool) {
        self.fast = fast;
    }

    fn is_internal(&self, cluster: &str) -> bool {
        self.children.contains_key(cluster)
    }

    fn resolve_root(cluster: &str) -> &str {
        if cluster.eq_ignore_ascii_case("RANGE") {
            ""
        } else {
            cluster
        }
    }

    /// All leaf names under `root`, in tree order. `root == ""` walks the
    /// whole inventory; a leaf root returns itself.
    fn leaves_under(&self, root: &str) -> Vec<String> {
        if self.leaves.contains_key(root) {
            return vec![root.to_string()];
        }
        let mut out = Vec::new();
        if let Some(kids) = self.children.get(root) {
            for child in kids {
                out.extend(self.leaves_under(child));
            }
        }
        out
    }

    fn leaf(&self, cluster: &str) -> Result<&Leaf> {
        self.leaves
            .get(cluster)
            .ok_or_else(|| RangeError::ClusterNotFound(cluster.to_string()))
    }
}

impl Store for TestStore {
    fn cluster_lookup(&self, clusters: &[String]) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for cluster in clusters {
            let root = Self::resolve_root(cluster);
            if let Some(leaf) = self.leaves.get(cluster) {
                let nodes = leaf
                    .attrs
                    .get(NODES_KEY)
                    .ok_or_else(|| RangeError::MalformedData {
                        cluster: cluster.clone(),
                        reason: "missing NODES".into(),
                    })?;
                out.extend(nodes.iter().cloned());
            } else if self.is_internal(root) {
                out.extend(self.children[root].iter().cloned());
            } else {
                return Err(RangeError::ClusterNotFound(cluster.clone()));
            }
        }
        crate::setops::dedup(&mut out);
        Ok(out)
    }

    fn key_lookup(&self, clusters: &[String], key: &str) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for cluster in clusters {
            let leaf = self.leaf(cluster)?;
            if key == KEYS_KEY {
                let mut keys: Vec<String> = leaf.attrs.keys().cloned().collect();
                keys.sort();
                out.extend(keys);
                continue;
            }
            let values = leaf.attrs.get(key).ok_or_else(|| RangeError::KeyNotFound {
                cluster: cluster.clone(),
                key: key.to_string(),
            })?;
            out.extend(values.iter().cloned());
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
        let root = Self::resolve_root(hint);
        let mut out = Vec::new();
        for leaf_name in self.leaves_under(root) {
            let leaf = &self.leaves[&leaf_name];
            if let Some(values) = leaf.attrs.get(attr) {
                if values.iter().any(|v| v == value) {
                    out.push(leaf_name.clone());
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

    #[test]
    fn cluster_lookup_root_is_top_level_clusters() {
        let store = TestStore::new();
        let got = store.cluster_lookup(&["RANGE".to_string()]).unwrap();
        assert_eq!(got, vec!["ops".to_string(), "data".to_string()]);
    }

    #[test]
    fn cluster_lookup_nested_is_fully_qualified() {
        let store = TestStore::new();
        let top = store.cluster_lookup(&["RANGE".to_string()]).unwrap();
        let got = store.cluster_lookup(&top).unwrap();
        assert_eq!(
            got,
            vec![
                "ops-prod".to_string(),
                "data-prod".to_string(),
                "data-qa".to_string(),
            ]
        );
    }

    #[test]
    fn cluster_lookup_leaf_returns_nodes() {
        let store = TestStore::new();
        let got = store
            .cluster_lookup(&["ops-prod-vpc1-range".to_string()])
            .unwrap();
        assert_eq!(
            got,
            vec![
                "range1001.ops.example.com".to_string(),
                "range1002.ops.example.com".to_string(),
                "range1003.ops.example.com".to_string(),
            ]
        );
    }

    #[test]
    fn cluster_lookup_unknown_cluster_errors() {
        let store = TestStore::new();
        let err = store.cluster_lookup(&["nope".to_string()]).unwrap_err();
        assert_eq!(err.code(), "CLUSTER_NOT_FOUND");
    }

    #[test]
    fn key_lookup_named_attribute() {
        let store = TestStore::new();
        let got = store
            .key_lookup(&["ops-prod-vpc1-range".to_string()], "AUTHORS")
            .unwrap();
        assert_eq!(got, vec!["Vigith Maurice".to_string()]);
    }

    #[test]
    fn key_lookup_keys_meta_attribute() {
        let store = TestStore::new();
        let got = store
            .key_lookup(&["data-qa-vpc5-log".to_string()], KEYS_KEY)
            .unwrap();
        assert_eq!(got, vec!["NODES".to_string(), "QAFOR".to_string()]);
    }

    #[test]
    fn key_lookup_on_internal_cluster_errors() {
        let store = TestStore::new();
        let err = store
            .key_lookup(&["ops-prod".to_string()], "AUTHORS")
            .unwrap_err();
        assert_eq!(err.code(), "CLUSTER_NOT_FOUND");
    }

    #[test]
    fn key_lookup_missing_attribute_errors() {
        let store = TestStore::new();
        let err = store
            .key_lookup(&["data-prod-vpc1-log".to_string()], "QAFOR")
            .unwrap_err();
        assert_eq!(err.code(), "KEY_NOT_FOUND");
    }

    #[test]
    fn reverse_lookup_by_node_name() {
        let store = TestStore::new();
        let got = store
            .key_reverse_lookup("range1001.ops.example.com")
            .unwrap();
        assert_eq!(got, vec!["ops-prod-vpc1-range".to_string()]);
    }

    #[test]
    fn reverse_lookup_by_attribute_whole_tree() {
        let mut store = TestStore::new();
        store.fast = false;
        let got = store.key_reverse_lookup_attr("Ops", "AUTHORS").unwrap();
        assert_eq!(
            got,
            vec!["ops-prod-vpc1-mon".to_string(), "ops-prod-vpc2-mon".to_string()]
        );
    }

    #[test]
    fn reverse_lookup_hint_restricts_to_subtree() {
        let mut store = TestStore::new();
        store.fast = false;
        let got = store
            .key_reverse_lookup_hint("Ops", "AUTHORS", "ops-prod-vpc2")
            .unwrap();
        assert_eq!(got, vec!["ops-prod-vpc2-mon".to_string()]);
    }

    #[test]
    fn reverse_lookup_fast_stops_at_first_match() {
        let store = TestStore::new();
        assert!(store.fast_lookup());
        let got = store.key_reverse_lookup_attr("Ops", "AUTHORS").unwrap();
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn intersection_of_two_reverse_lookups_narrows_to_shared_leaves() {
        // Mirrors spec.md §8's combined-expression scenario: union of the
        // two AUTHORS reverse lookups, intersected with an explicit set.
        let mut store = TestStore::new();
        store.fast = false;
        let ops_authors = store.key_reverse_lookup_attr("Ops", "AUTHORS").unwrap();
        let vigith_authors = store
            .key_reverse_lookup_attr("Vigith Maurice", "AUTHORS")
            .unwrap();
        let unioned = crate::setops::union(&ops_authors, &vigith_authors);
        let explicit = vec![
            "ops-prod-vpc1-range".to_string(),
            "ops-prod-vpc1-mon".to_string(),
        ];
        let narrowed = crate::setops::intersection(&unioned, &explicit);
        assert_eq!(
            narrowed,
            vec!["ops-prod-vpc1-range".to_string(), "ops-prod-vpc1-mon".to_string()]
        );
    }
}
