//! Directory-tree + per-leaf YAML backend. See `spec.md` §4.3.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_yaml::Value as Yaml;
use tracing::{debug, trace};

use crate::error::{RangeError, Result};
use crate::store::{Store, KEYS_KEY, NODES_KEY};

const LEAF_FILE: &str = "cluster.yaml";

/// Directory-tree backend. Cluster name `a-b-c` maps to path
/// `root/a/b/c`; a directory is a leaf iff it directly contains
/// `cluster.yaml`.
pub struct FileStore {
    root: PathBuf,
    /// Reserved for future depth-bounded walks; unused today, carried
    /// from the construction parameters `spec.md` §6 enumerates.
    #[allow(dead_code)]
    max_depth: Option<usize>,
    fast: bool,
}

impl FileStore {
    /// Open a `FileStore` rooted at `path`. A missing root directory is
    /// fatal (`spec.md` §4.3 "Failure modes").
    pub fn open<P: Into<PathBuf>>(path: P, max_depth: Option<usize>, fast_lookup: bool) -> Result<Self> {
        let root = path.into();
        if !root.is_dir() {
            return Err(RangeError::Backend(format!(
                "FileStore root {} does not exist or is not a directory",
                root.display()
            )));
        }
        debug!(root = %root.display(), fast_lookup, "opened FileStore");
        Ok(FileStore {
            root,
            max_depth,
            fast: fast_lookup,
        })
    }

    fn cluster_path(&self, cluster: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in cluster.split('-') {
            path.push(segment);
        }
        path
    }

    fn is_leaf(dir: &Path) -> bool {
        dir.join(LEAF_FILE).is_file()
    }

    fn read_leaf(&self, cluster: &str, dir: &Path) -> Result<HashMap<String, Vec<String>>> {
        let raw = std::fs::read_to_string(dir.join(LEAF_FILE)).map_err(|e| RangeError::Backend(e.to_string()))?;
        let parsed: Yaml = serde_yaml::from_str(&raw).map_err(|e| RangeError::MalformedData {
            cluster: cluster.to_string(),
            reason: e.to_string(),
        })?;
        let mapping = parsed.as_mapping().ok_or_else(|| RangeError::MalformedData {
            cluster: cluster.to_string(),
            reason: "cluster.yaml is not a top-level mapping".to_string(),
        })?;

        let mut attrs = HashMap::new();
        for (k, v) in mapping {
            let key = k.as_str().ok_or_else(|| RangeError::MalformedData {
                cluster: cluster.to_string(),
                reason: "non-string key in cluster.yaml".to_string(),
            })?;
            attrs.insert(key.to_string(), coerce_values(cluster, v)?);
        }
        Ok(attrs)
    }

    fn children(&self, cluster: &str, dir: &Path) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(dir).map_err(|e| RangeError::Backend(e.to_string()))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RangeError::Backend(e.to_string()))?;
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        if names.is_empty() {
            return Err(RangeError::MalformedData {
                cluster: cluster.to_string(),
                reason: "directory is neither a leaf (no cluster.yaml) nor has children".to_string(),
            });
        }
        Ok(names)
    }

    /// `true` for the literal root token `spec.md` §4.2 reserves
    /// (`%RANGE`), matching `test_store.rs`'s `resolve_root`.
    fn is_range_literal(cluster: &str) -> bool {
        cluster.eq_ignore_ascii_case("RANGE")
    }

    /// Resolve a cluster name to its directory, erroring if it doesn't
    /// exist. `""` or the literal `RANGE` resolves to the store root.
    fn resolve(&self, cluster: &str) -> Result<PathBuf> {
        let path = if cluster.is_empty() || Self::is_range_literal(cluster) {
            self.root.clone()
        } else {
            self.cluster_path(cluster)
        };
        if !path.is_dir() {
            return Err(RangeError::ClusterNotFound(cluster.to_string()));
        }
        Ok(path)
    }

    /// Read a leaf cluster's full attribute map. Public so `rangeload`
    /// can walk a `FileStore` tree and replay its contents into a
    /// `KVStore` without duplicating YAML parsing.
    pub fn leaf_attrs(&self, cluster: &str) -> Result<HashMap<String, Vec<String>>> {
        let dir = self.resolve(cluster)?;
        if !Self::is_leaf(&dir) {
            return Err(RangeError::NotALeaf(cluster.to_string(), String::new()));
        }
        self.read_leaf(cluster, &dir)
    }

    /// Recursively collect every leaf cluster name under `root_cluster`
    /// (`""` = whole tree), in directory-walk order. Used both by
    /// reverse lookups and by `rangeload` to populate a `KVStore`.
    pub fn walk_leaves(&self, root_cluster: &str) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let dir = self.resolve(root_cluster)?;
        self.walk_leaves_into(root_cluster, &dir, &mut out)?;
        Ok(out)
    }

    fn walk_leaves_into(&self, cluster: &str, dir: &Path, out: &mut Vec<String>) -> Result<()> {
        if Self::is_leaf(dir) {
            out.push(cluster.to_string());
            return Ok(());
        }
        for child in self.children(cluster, dir)? {
            let child_cluster = if cluster.is_empty() {
                child.clone()
            } else {
                format!("{cluster}-{child}")
            };
            let child_dir = dir.join(&child);
            self.walk_leaves_into(&child_cluster, &child_dir, out)?;
        }
        Ok(())
    }
}

fn coerce_values(cluster: &str, value: &Yaml) -> Result<Vec<String>> {
    match value {
        Yaml::Sequence(items) => items.iter().map(|v| coerce_scalar(cluster, v)).collect(),
        scalar => Ok(vec![coerce_scalar(cluster, scalar)?]),
    }
}

fn coerce_scalar(cluster: &str, value: &Yaml) -> Result<String> {
    match value {
        Yaml::String(s) => Ok(s.clone()),
        Yaml::Bool(b) => Ok(b.to_string()),
        Yaml::Number(n) => Ok(n.to_string()),
        other => Err(RangeError::MalformedData {
            cluster: cluster.to_string(),
            reason: format!("expected a scalar or list of scalars, found {other:?}"),
        }),
    }
}

impl Store for FileStore {
    fn cluster_lookup(&self, clusters: &[String]) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for cluster in clusters {
            let dir = self.resolve(cluster)?;
            if Self::is_leaf(&dir) {
                let attrs = self.read_leaf(cluster, &dir)?;
                let nodes = attrs.get(NODES_KEY).ok_or_else(|| RangeError::MalformedData {
                    cluster: cluster.clone(),
                    reason: "leaf is missing NODES".to_string(),
                })?;
                out.extend(nodes.iter().cloned());
            } else {
                out.extend(self.children(cluster, &dir)?);
            }
        }
        crate::setops::dedup(&mut out);
        Ok(out)
    }

    fn key_lookup(&self, clusters: &[String], key: &str) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for cluster in clusters {
            let dir = self.resolve(cluster)?;
            if !Self::is_leaf(&dir) {
                return Err(RangeError::NotALeaf(cluster.clone(), key.to_string()));
            }
            let attrs = self.read_leaf(cluster, &dir)?;
            if key == KEYS_KEY {
                let mut keys: Vec<String> = attrs.keys().cloned().collect();
                keys.sort();
                out.extend(keys);
                continue;
            }
            let values = attrs.get(key).ok_or_else(|| RangeError::KeyNotFound {
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
        trace!(value, attr, hint, "FileStore reverse lookup (full scan)");
        let mut out = Vec::new();
        for leaf in self.walk_leaves(hint)? {
            let dir = self.cluster_path(&leaf);
            let attrs = self.read_leaf(&leaf, &dir)?;
            if let Some(values) = attrs.get(attr) {
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
