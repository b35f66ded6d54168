//! Typed operations over the treestat tables.
//!
//! `TreeStore` owns the environment and gives every phase its record-level
//! interface: checked node upserts with ancestor materialisation during
//! ingest, child and mapping lookups during finalize and query, driver
//! state, and the per-phase table resets.

use treestat_kv::tables;
use treestat_kv::{table_error, KvEnv, KvOptions, MultimapTable, Table};
use treestat_types::{make_error_msg, Result, TreeCode};

use crate::keys::{aggregate_key, path_key, Digest, PathKey, StatMappingKey};
use crate::records::{AggregateStats, NodeStats, StatMapping, TreeNode};
use crate::schema;

/// The synthetic root path. Every ancestor walk terminates here.
pub const ROOT_PATH: &str = "/";

pub struct TreeStore {
    env: KvEnv,
}

impl TreeStore {
    /// Open or create the store and make sure every table exists.
    pub fn open(opts: &KvOptions) -> Result<Self> {
        treestat_kv::validate_options(opts)?;
        let env = KvEnv::open(opts)?;
        schema::ensure_tables(&env)?;
        Ok(Self { env })
    }

    pub fn env(&self) -> &KvEnv {
        &self.env
    }

    // ------------------------------------------------------------------
    // Driver state
    // ------------------------------------------------------------------

    /// Read the persisted driver state; a missing entry reads as `""`.
    pub fn state(&self) -> Result<String> {
        self.env.view(|txn| {
            let t = txn.open_table(schema::TREE_SERVE).map_err(table_error)?;
            let raw = tables::get(&t, schema::STATE_KEY)?;
            match raw {
                None => Ok(String::new()),
                Some(bytes) => String::from_utf8(bytes).map_err(|_| {
                    treestat_types::Status::with_message(
                        treestat_types::StatusCode::DATA_CORRUPTION,
                        "driver state is not UTF-8",
                    )
                }),
            }
        })
    }

    pub fn set_state(&self, state: &str) -> Result<()> {
        self.env.update(|txn| {
            let mut t = txn.open_table(schema::TREE_SERVE).map_err(table_error)?;
            tables::put(&mut t, schema::STATE_KEY, state.as_bytes(), true)?;
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Ingest
    // ------------------------------------------------------------------

    /// Write (or verify) the node for `node_path` together with every
    /// missing ancestor directory and the parent→child edges, atomically.
    /// Returns how many nodes were newly created.
    ///
    /// An existing record whose name or parent disagrees with the incoming
    /// line means the input or the store is corrupt. A matching record is
    /// overwritten, so a directory's real dump line replaces the zero-stat
    /// placeholder an earlier descendant materialised.
    pub fn create_tree_node(&self, node_path: &str, stats: NodeStats) -> Result<u64> {
        let node_path = normalize_path(node_path);
        self.env.update(|txn| {
            let mut nodes = txn.open_table(schema::TREE_NODE).map_err(table_error)?;
            let mut children = txn.open_multimap_table(schema::CHILDREN).map_err(table_error)?;
            let mut created = 0u64;
            insert_node(&mut nodes, &mut children, node_path, stats, &mut created)?;
            Ok(created)
        })
    }

    /// Clear the tables the ingest phase owns.
    pub fn reset_tree(&self) -> Result<()> {
        self.env.update(|txn| {
            tables::reset_table(txn, schema::TREE_NODE)?;
            tables::reset_multimap(txn, schema::CHILDREN)
        })
    }

    // ------------------------------------------------------------------
    // Nodes & edges
    // ------------------------------------------------------------------

    pub fn get_node(&self, key: &PathKey) -> Result<Option<TreeNode>> {
        self.env.view(|txn| {
            let t = txn.open_table(schema::TREE_NODE).map_err(table_error)?;
            match tables::get(&t, key.as_bytes())? {
                None => Ok(None),
                Some(buf) => Ok(Some(TreeNode::decode(&buf)?)),
            }
        })
    }

    /// Load a node that an invariant says must exist.
    pub fn require_node(&self, key: &PathKey) -> Result<TreeNode> {
        self.get_node(key)?
            .ok_or_else(|| crate::keys::missing("node", key))
    }

    pub fn list_children(&self, key: &PathKey) -> Result<Vec<PathKey>> {
        self.env.view(|txn| {
            let t = txn.open_multimap_table(schema::CHILDREN).map_err(table_error)?;
            let raw = tables::set_values(&t, key.as_bytes())?;
            raw.iter().map(|v| Digest::from_bytes(v)).collect()
        })
    }

    // ------------------------------------------------------------------
    // Aggregates
    // ------------------------------------------------------------------

    /// Clear the tables the finalize phase owns.
    pub fn reset_aggregates(&self) -> Result<()> {
        self.env.update(|txn| {
            tables::reset_table(txn, schema::STAT_MAPPING)?;
            tables::reset_multimap(txn, schema::STAT_MAPPINGS)?;
            tables::reset_table(txn, schema::AGGREGATE_STATS)
        })
    }

    /// Persist one combined aggregate for `node` under `sm_key`: the
    /// mappings-index entry, the mapping record, and the numbers. Runs
    /// inside the caller's write transaction.
    pub fn put_node_aggregate(
        txn: &treestat_kv::WriteTransaction,
        node: &PathKey,
        sm_key: &StatMappingKey,
        mapping: &StatMapping,
        stats: &AggregateStats,
    ) -> Result<()> {
        let mut index = txn
            .open_multimap_table(schema::STAT_MAPPINGS)
            .map_err(table_error)?;
        tables::add_to_set(&mut index, node.as_bytes(), sm_key.as_bytes())?;

        let mut mappings = txn.open_table(schema::STAT_MAPPING).map_err(table_error)?;
        // Write-once: the record under a digest never changes content, so
        // an existing entry can be left alone.
        tables::put(&mut mappings, sm_key.as_bytes(), &mapping.encode(), false)?;

        let mut aggregates = txn
            .open_table(schema::AGGREGATE_STATS)
            .map_err(table_error)?;
        let ak = aggregate_key(node, sm_key);
        tables::put(&mut aggregates, ak.as_bytes(), &stats.encode(), true)?;
        Ok(())
    }

    pub fn list_stat_mappings(&self, node: &PathKey) -> Result<Vec<StatMappingKey>> {
        self.env.view(|txn| {
            let t = txn
                .open_multimap_table(schema::STAT_MAPPINGS)
                .map_err(table_error)?;
            let raw = tables::set_values(&t, node.as_bytes())?;
            raw.iter().map(|v| Digest::from_bytes(v)).collect()
        })
    }

    pub fn get_stat_mapping(&self, sm_key: &StatMappingKey) -> Result<Option<StatMapping>> {
        self.env.view(|txn| {
            let t = txn.open_table(schema::STAT_MAPPING).map_err(table_error)?;
            match tables::get(&t, sm_key.as_bytes())? {
                None => Ok(None),
                Some(buf) => Ok(Some(StatMapping::decode(&buf)?)),
            }
        })
    }

    pub fn get_aggregate(
        &self,
        node: &PathKey,
        sm_key: &StatMappingKey,
    ) -> Result<Option<AggregateStats>> {
        self.env.view(|txn| {
            let t = txn
                .open_table(schema::AGGREGATE_STATS)
                .map_err(table_error)?;
            let ak = aggregate_key(node, sm_key);
            match tables::get(&t, ak.as_bytes())? {
                None => Ok(None),
                Some(buf) => Ok(Some(AggregateStats::decode(&buf)?)),
            }
        })
    }

    /// Entry counts of the main tables, for progress logs.
    pub fn table_counts(&self) -> Result<TableCounts> {
        self.env.view(|txn| {
            let nodes = txn.open_table(schema::TREE_NODE).map_err(table_error)?;
            let mappings = txn.open_table(schema::STAT_MAPPING).map_err(table_error)?;
            let aggregates = txn
                .open_table(schema::AGGREGATE_STATS)
                .map_err(table_error)?;
            Ok(TableCounts {
                nodes: tables::len(&nodes)?,
                stat_mappings: tables::len(&mappings)?,
                aggregates: tables::len(&aggregates)?,
            })
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableCounts {
    pub nodes: u64,
    pub stat_mappings: u64,
    pub aggregates: u64,
}

/// Strip trailing slashes so `/a/b/` and `/a/b` key the same node. The root
/// itself stays `/`.
pub fn normalize_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        ROOT_PATH
    } else {
        trimmed
    }
}

/// The path one level up; the root is its own boundary.
pub fn parent_path(path: &str) -> &str {
    let trimmed = normalize_path(path);
    match trimmed.rfind('/') {
        Some(0) | None => ROOT_PATH,
        Some(i) => &trimmed[..i],
    }
}

fn insert_node(
    nodes: &mut Table<&'static [u8], &'static [u8]>,
    children: &mut MultimapTable<&'static [u8], &'static [u8]>,
    node_path: &str,
    stats: NodeStats,
    created: &mut u64,
) -> Result<PathKey> {
    let node_key = path_key(node_path);
    let parent_key = if node_path == ROOT_PATH {
        Digest::zero()
    } else {
        ensure_directory(nodes, children, parent_path(node_path), created)?
    };

    let node = TreeNode {
        name: node_path.to_string(),
        parent_key,
        stats,
    };

    if let Some(buf) = tables::get(nodes, node_key.as_bytes())? {
        let existing = TreeNode::decode(&buf)?;
        if existing.name != node.name {
            return make_error_msg(
                TreeCode::NAME_MISMATCH,
                format!("stored name '{}' != incoming '{}'", existing.name, node.name),
            );
        }
        if existing.parent_key != node.parent_key {
            return make_error_msg(
                TreeCode::PARENT_MISMATCH,
                format!("node '{}' parent changed", node.name),
            );
        }
    } else {
        *created += 1;
    }
    tables::put(nodes, node_key.as_bytes(), &node.encode(), true)?;

    if node_path != ROOT_PATH {
        tables::add_to_set(children, parent_key.as_bytes(), node_key.as_bytes())?;
    }
    Ok(node_key)
}

fn ensure_directory(
    nodes: &mut Table<&'static [u8], &'static [u8]>,
    children: &mut MultimapTable<&'static [u8], &'static [u8]>,
    dir_path: &str,
    created: &mut u64,
) -> Result<PathKey> {
    let key = path_key(dir_path);
    if tables::get(nodes, key.as_bytes())?.is_some() {
        return Ok(key);
    }
    insert_node(
        nodes,
        children,
        dir_path,
        NodeStats::directory_placeholder(),
        created,
    )
}
