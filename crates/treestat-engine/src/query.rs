//! Read-only query adapter.
//!
//! Everything here runs against a `treeReady` store and only reads. The
//! record-level contract (`get_node`, `list_children`,
//! `list_stat_mappings`, `get_aggregate`, `get_stat_mapping`) lives on
//! [`TreeStore`]; this module assembles those calls into the JSON node
//! report served to consumers.

use serde::Serialize;
use treestat_types::{AggCode, Result, Status};

use crate::keys::{path_key, PathKey};
use crate::records::TreeNode;
use crate::store::{normalize_path, TreeStore};

/// One aggregate row of a node report. Numbers are decimal strings because
/// they routinely exceed 64 bits.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MappingEntry {
    pub user: String,
    pub group: String,
    pub tag: String,
    pub size: String,
    pub count: String,
    pub create_cost: String,
    pub modify_cost: String,
    pub access_cost: String,
}

/// A node with its stats, aggregates and (depth-limited) children.
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub path: String,
    pub file_type: String,
    pub size: u64,
    pub uid: u64,
    pub gid: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub parent: Option<String>,
    pub mappings: Vec<MappingEntry>,
    pub child_count: usize,
    pub children: Vec<NodeReport>,
}

/// Assemble the report for `path`, descending `depth` levels of children.
pub fn node_report(store: &TreeStore, path: &str, depth: usize) -> Result<NodeReport> {
    let key = path_key(normalize_path(path));
    let node = store.require_node(&key)?;
    build_report(store, &key, &node, depth)
}

fn build_report(
    store: &TreeStore,
    key: &PathKey,
    node: &TreeNode,
    depth: usize,
) -> Result<NodeReport> {
    let mut mappings = Vec::new();
    for sm_key in store.list_stat_mappings(key)? {
        let sm = store.get_stat_mapping(&sm_key)?.ok_or_else(|| {
            Status::with_message(
                AggCode::MAPPING_NOT_FOUND,
                format!("stat mapping {sm_key} indexed but not stored"),
            )
        })?;
        let stats = store.get_aggregate(key, &sm_key)?.ok_or_else(|| {
            Status::with_message(
                AggCode::MAPPING_NOT_FOUND,
                format!("aggregate for mapping {sm_key} indexed but not stored"),
            )
        })?;
        mappings.push(MappingEntry {
            user: sm.user,
            group: sm.group,
            tag: sm.tag,
            size: stats.size.to_string(),
            count: stats.count.to_string(),
            create_cost: stats.create_cost.to_string(),
            modify_cost: stats.modify_cost.to_string(),
            access_cost: stats.access_cost.to_string(),
        });
    }
    mappings.sort_by(|a, b| {
        (&a.user, &a.group, &a.tag).cmp(&(&b.user, &b.group, &b.tag))
    });

    let parent = if node.parent_key.is_zero() {
        None
    } else {
        store.get_node(&node.parent_key)?.map(|p| p.name)
    };

    let child_keys = store.list_children(key)?;
    let child_count = child_keys.len();
    let mut children = Vec::new();
    if depth > 0 {
        for child_key in &child_keys {
            let child = store.require_node(child_key)?;
            children.push(build_report(store, child_key, &child, depth - 1)?);
        }
        children.sort_by(|a, b| a.path.cmp(&b.path));
    }

    Ok(NodeReport {
        path: node.name.clone(),
        file_type: (node.stats.file_type as char).to_string(),
        size: node.stats.size,
        uid: node.stats.uid,
        gid: node.stats.gid,
        atime: node.stats.atime,
        mtime: node.stats.mtime,
        ctime: node.stats.ctime,
        parent,
        mappings,
        child_count,
        children,
    })
}
