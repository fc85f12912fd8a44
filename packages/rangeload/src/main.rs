//! `rangeload` — walks a `FileStore` tree and replays it into a
//! `KVStore`-compatible etcd v2 backend: per-leaf attribute entries,
//! `_leaf` sentinels, an optional `_roptimize/<value>` reverse index,
//! and the `_range_store = loaded` sentinel that marks the store ready
//! for `rangequery-server` to serve from.

use std::collections::HashMap;

use clap::Parser;
use tracing::{info, warn};

use rangequery_core::store::{FileStore, NODES_KEY};

const LEAF_SENTINEL: &str = "_leaf";
const READY_SENTINEL: &str = "_range_store";
const READY_VALUE: &str = "loaded";
const ROPTIMIZE_PREFIX: &str = "_roptimize";

#[derive(Parser, Debug)]
#[command(name = "rangeload", about = "Load a FileStore tree into a KVStore backend")]
struct Cli {
    /// FileStore root directory to read from.
    #[arg(long)]
    source: String,

    /// Single etcd v2 endpoint to write to (`http://host:port`).
    #[arg(long)]
    endpoint: String,

    /// KVStore root prefix to write under.
    #[arg(long, default_value = "/range")]
    kv_root: String,

    /// Only load this subtree (cluster name, `-`-joined); default is
    /// the whole tree.
    #[arg(long, default_value = "")]
    root_cluster: String,

    /// Also build the `_roptimize/<value>` reverse index for NODES.
    #[arg(long)]
    roptimize: bool,
}

struct Writer {
    client: reqwest::blocking::Client,
    endpoint: String,
    kv_root: String,
}

impl Writer {
    fn new(endpoint: String, kv_root: String) -> anyhow::Result<Self> {
        Ok(Writer {
            client: reqwest::blocking::Client::builder().build()?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            kv_root: kv_root.trim_end_matches('/').to_string(),
        })
    }

    fn put(&self, path: &str, value: &str) -> anyhow::Result<()> {
        let url = format!("{}/v2/keys{}{path}", self.endpoint, self.kv_root);
        let resp = self.client.put(&url).form(&[("value", value)]).send()?;
        if !resp.status().is_success() {
            anyhow::bail!("PUT {url} failed: {}", resp.status());
        }
        Ok(())
    }

    fn get(&self, path: &str) -> anyhow::Result<Option<String>> {
        let url = format!("{}/v2/keys{}{path}", self.endpoint, self.kv_root);
        let resp = self.client.get(&url).send()?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            anyhow::bail!("GET {url} failed: {}", resp.status());
        }
        let body: serde_json::Value = resp.json()?;
        Ok(body["node"]["value"].as_str().map(|s| s.to_string()))
    }

    fn append_roptimize(&self, value: &str, leaf: &str) -> anyhow::Result<()> {
        let path = format!("/{ROPTIMIZE_PREFIX}/{value}");
        let mut leaves: Vec<String> = self
            .get(&path)?
            .unwrap_or_default()
            .split('\t')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        if !leaves.iter().any(|l| l == leaf) {
            leaves.push(leaf.to_string());
        }
        self.put(&path, &leaves.join("\t"))
    }
}

fn leaf_path(cluster: &str) -> String {
    format!("/{}", cluster.replace('-', "/"))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();

    let source = FileStore::open(&cli.source, None, false)?;
    let writer = Writer::new(cli.endpoint.clone(), cli.kv_root.clone())?;

    let leaves = source.walk_leaves(&cli.root_cluster)?;
    info!(count = leaves.len(), root = %cli.root_cluster, "loading leaves");

    for cluster in &leaves {
        let attrs = source.leaf_attrs(cluster)?;
        let path = leaf_path(cluster);
        write_leaf(&writer, &path, &attrs)?;
        writer.put(&format!("{path}/{LEAF_SENTINEL}"), "")?;

        if cli.roptimize {
            if let Some(nodes) = attrs.get(NODES_KEY) {
                for node in nodes {
                    writer.append_roptimize(node, cluster)?;
                }
            }
        }
    }

    writer.put(&format!("/{READY_SENTINEL}"), READY_VALUE)?;
    info!("store marked ready ({READY_SENTINEL} = {READY_VALUE})");
    Ok(())
}

fn write_leaf(writer: &Writer, leaf_path: &str, attrs: &HashMap<String, Vec<String>>) -> anyhow::Result<()> {
    for (key, values) in attrs {
        if values.is_empty() {
            warn!(leaf_path, key, "skipping attribute with no values");
            continue;
        }
        writer.put(&format!("{leaf_path}/{key}"), &values.join("\t"))?;
    }
    Ok(())
}
