//! Named tables of the treestat store.
//!
//! Six logical tables keyed by 16-byte digests (except the driver table,
//! which holds a single state entry under a literal key).

use treestat_kv::tables::{ByteMultimap, ByteTable};
use treestat_kv::{table_error, KvEnv, MultimapTableDefinition, TableDefinition};
use treestat_types::Result;

/// Driver bookkeeping; holds the phase state under [`STATE_KEY`].
pub const TREE_SERVE: ByteTable = TableDefinition::new("TreeServe");

/// Path digest -> encoded tree node.
pub const TREE_NODE: ByteTable = TableDefinition::new("TreeNode");

/// Directory digest -> set of child digests.
pub const CHILDREN: ByteMultimap = MultimapTableDefinition::new("Children");

/// Stat-mapping digest -> encoded (user, group, tag) record.
pub const STAT_MAPPING: ByteTable = TableDefinition::new("StatMapping");

/// Node digest -> set of stat-mapping digests with aggregates for that node.
pub const STAT_MAPPINGS: ByteMultimap = MultimapTableDefinition::new("StatMappings");

/// Aggregate digest -> encoded five-number aggregate record.
pub const AGGREGATE_STATS: ByteTable = TableDefinition::new("AggregateStats");

/// Key of the driver state entry in [`TREE_SERVE`].
pub const STATE_KEY: &[u8] = b"state";

/// Create every table so later read transactions never observe a missing
/// one. Safe to call on an already-populated environment.
pub fn ensure_tables(env: &KvEnv) -> Result<()> {
    env.update(|txn| {
        txn.open_table(TREE_SERVE).map_err(table_error)?;
        txn.open_table(TREE_NODE).map_err(table_error)?;
        txn.open_multimap_table(CHILDREN).map_err(table_error)?;
        txn.open_table(STAT_MAPPING).map_err(table_error)?;
        txn.open_multimap_table(STAT_MAPPINGS).map_err(table_error)?;
        txn.open_table(AGGREGATE_STATS).map_err(table_error)?;
        Ok(())
    })
}
