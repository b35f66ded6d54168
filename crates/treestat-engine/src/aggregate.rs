//! Finalize phase: post-order aggregation over the materialised tree.
//!
//! A bounded pool of workers walks the tree from a start node. Child work
//! is handed to the shared rendezvous queue when a worker is free to take
//! it; a full queue means the current worker recurses inline instead, which
//! keeps the queue depth bounded and guarantees progress no matter how wide
//! a directory fans out. A node's records are persisted before its combined
//! results go to the parent, so aggregates become durable in strict
//! post-order. Every blocking channel operation races the shared
//! cancellation latch.

use std::collections::BTreeMap;
use std::thread;

use crossbeam_channel::{bounded, select, Sender, TrySendError};
use treestat_types::{make_error, make_error_msg, AggCode, Result, Status, StatusCode};
use treestat_utils::bignum::BigNum;

use crate::cancel::{cancel_pair, CancelToken};
use crate::config::Settings;
use crate::keys::{path_key, PathKey, StatMappingKey};
use crate::records::{AggregateStats, StatMapping};
use crate::store::{normalize_path, TreeStore};
use crate::tags::node_tags;

/// What the phase did, for the driver's log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizeSummary {
    pub nodes_finalized: u64,
}

/// Aggregate numbers together with the stat mappings they are filed under.
/// While in flight between a node and its parent, one value may carry many
/// mappings (they all share the same numbers); combined groups carry
/// exactly one.
#[derive(Debug, Clone)]
pub struct MappedStats {
    pub mappings: BTreeMap<StatMappingKey, StatMapping>,
    pub nums: AggregateStats,
}

struct WorkItem {
    node: PathKey,
    depth: usize,
    results: Sender<Vec<MappedStats>>,
}

/// Run the finalize phase rooted at `start_path`. Resets the aggregate
/// tables first so a re-run starts from scratch.
pub fn finalize(store: &TreeStore, start_path: &str, settings: &Settings) -> Result<FinalizeSummary> {
    store.reset_aggregates()?;

    let workers = settings.finalize_workers;
    let ref_time = settings.cost_reference_time;
    let (canceller, token) = cancel_pair();
    let (work_tx, work_rx) = bounded::<WorkItem>(0);
    let (progress_tx, progress_rx) = bounded::<PathKey>(workers);

    tracing::info!(workers, start_path, "starting finalize workers");

    let finalized = thread::scope(|scope| -> Result<u64> {
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let work_rx = work_rx.clone();
            let work_tx = work_tx.clone();
            let progress_tx = progress_tx.clone();
            let token = token.clone();
            let canceller = &canceller;
            handles.push(scope.spawn(move || -> Result<()> {
                loop {
                    let item = select! {
                        recv(token.channel()) -> _ => return Ok(()),
                        recv(work_rx) -> msg => match msg {
                            Ok(item) => item,
                            Err(_) => return Ok(()),
                        },
                    };
                    if let Err(status) =
                        aggregate_subtree(store, &token, item, &work_tx, &progress_tx, ref_time)
                    {
                        if status.is_cancelled() {
                            return Ok(());
                        }
                        tracing::error!(worker_id, error = %status, "finalize worker failed");
                        canceller.cancel();
                        return Err(status);
                    }
                }
            }));
        }
        drop(work_rx);

        // Submit the root and wait for its combined results, draining the
        // progress channel for bookkeeping along the way.
        let root_key = path_key(normalize_path(start_path));
        let (root_tx, root_rx) = bounded::<Vec<MappedStats>>(1);
        let root_item = WorkItem {
            node: root_key,
            depth: 0,
            results: root_tx,
        };
        select! {
            recv(token.channel()) -> _ => {},
            send(work_tx, root_item) -> _res => {},
        }
        drop(work_tx);

        let mut finalized = 0u64;
        let stop_after = settings.stop_finalize_after_n_nodes;
        let info_every = settings.nodes_finalized_info_every_n;
        loop {
            select! {
                recv(root_rx) -> msg => {
                    if let Ok(results) = msg {
                        tracing::info!(groups = results.len(), "finalize complete at start node");
                    }
                    // A disconnect means the root item was abandoned; the
                    // worker join below carries the reason.
                    break;
                },
                recv(progress_rx) -> msg => {
                    if msg.is_ok() {
                        finalized += 1;
                        if finalized % info_every == 0 {
                            tracing::info!(nodes_finalized = finalized, "finalized nodes");
                        }
                        if stop_after >= 0 && finalized >= stop_after as u64 {
                            tracing::warn!(stop_after, "cancelling finalize at configured node bound");
                            break;
                        }
                    }
                },
            }
        }

        canceller.cancel();

        let mut first_err = None;
        for handle in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(status)) => {
                    first_err.get_or_insert(status);
                }
                Err(_) => {
                    first_err.get_or_insert(Status::with_message(
                        StatusCode::FOUND_BUG,
                        "finalize worker panicked",
                    ));
                }
            }
        }
        match first_err {
            Some(status) => Err(status),
            None => Ok(finalized),
        }
    })?;

    tracing::info!(nodes_finalized = finalized, "finalize workers finished");
    Ok(FinalizeSummary {
        nodes_finalized: finalized,
    })
}

/// Process one subtree: fan its children out (or recurse inline when the
/// queue is busy), fold the child results into this node's own stats,
/// persist, then report upward.
fn aggregate_subtree(
    store: &TreeStore,
    token: &CancelToken,
    item: WorkItem,
    work_tx: &Sender<WorkItem>,
    progress_tx: &Sender<PathKey>,
    ref_time: i64,
) -> Result<()> {
    let node = item.node;
    let children = store.list_children(&node)?;
    let (child_tx, child_rx) = bounded::<Vec<MappedStats>>(children.len());

    for child in &children {
        if token.is_cancelled() {
            return make_error(StatusCode::CANCELLED);
        }
        let child_item = WorkItem {
            node: *child,
            depth: item.depth + 1,
            results: child_tx.clone(),
        };
        match work_tx.try_send(child_item) {
            Ok(()) => {}
            Err(TrySendError::Full(child_item)) => {
                // No free worker slot: keep this subtree on our own stack.
                aggregate_subtree(store, token, child_item, work_tx, progress_tx, ref_time)?;
            }
            Err(TrySendError::Disconnected(_)) => return make_error(StatusCode::CANCELLED),
        }
    }
    drop(child_tx);

    let mut collected = vec![node_local_stats(store, &node, ref_time)?];
    for _ in 0..children.len() {
        let child_stats = select! {
            recv(token.channel()) -> _ => return make_error(StatusCode::CANCELLED),
            recv(child_rx) -> msg => msg.map_err(|_| Status::new(StatusCode::CANCELLED))?,
        };
        collected.extend(child_stats);
    }

    let combined = combine(collected);
    persist_node_aggregates(store, &node, &combined)?;

    select! {
        recv(token.channel()) -> _ => return make_error(StatusCode::CANCELLED),
        send(item.results, combined) -> res => {
            if res.is_err() {
                return make_error(StatusCode::CANCELLED);
            }
        },
    }

    select! {
        recv(token.channel()) -> _ => {},
        send(progress_tx, node) -> _res => {},
    }
    Ok(())
}

/// This node's own contribution: one stats value filed under the full
/// cartesian mapping set `{*, uid} x {*, gid} x tags`.
fn node_local_stats(store: &TreeStore, node: &PathKey, ref_time: i64) -> Result<MappedStats> {
    let tree_node = store.get_node(node)?.ok_or_else(|| {
        Status::with_message(AggCode::MISSING_CHILD, format!("node {node} has no record"))
    })?;
    let stats = tree_node.stats;

    let tags = node_tags(&tree_node.name, stats.file_type);
    let mut mappings = BTreeMap::new();
    for user in ["*".to_string(), stats.uid.to_string()] {
        for group in ["*".to_string(), stats.gid.to_string()] {
            for tag in &tags {
                let sm = StatMapping::new(user.clone(), group.clone(), tag.clone());
                mappings.insert(sm.key(), sm);
            }
        }
    }

    let size = BigNum::from_u64(stats.size);
    let nums = AggregateStats {
        count: BigNum::from_u64(1),
        create_cost: BigNum::mul(&size, &elapsed_secs(ref_time, stats.ctime)),
        modify_cost: BigNum::mul(&size, &elapsed_secs(ref_time, stats.mtime)),
        access_cost: BigNum::mul(&size, &elapsed_secs(ref_time, stats.atime)),
        size,
    };
    Ok(MappedStats { mappings, nums })
}

/// Seconds from `event` to the reference time, clamped at zero for events
/// recorded in the future.
fn elapsed_secs(ref_time: i64, event: i64) -> BigNum {
    let diff = (ref_time as i128 - event as i128).max(0);
    BigNum::from_u128(diff as u128)
}

/// Group a list of mapped stats by stat-mapping key, summing numbers
/// component-wise. The result carries one group per distinct mapping, in
/// key order.
fn combine(inputs: Vec<MappedStats>) -> Vec<MappedStats> {
    let mut flattened: BTreeMap<StatMappingKey, MappedStats> = BTreeMap::new();
    for input in inputs {
        for (key, sm) in &input.mappings {
            match flattened.get_mut(key) {
                Some(group) => group.nums.add_assign(&input.nums),
                None => {
                    let mut mappings = BTreeMap::new();
                    mappings.insert(*key, sm.clone());
                    flattened.insert(
                        *key,
                        MappedStats {
                            mappings,
                            nums: input.nums.clone(),
                        },
                    );
                }
            }
        }
    }
    flattened.into_values().collect()
}

/// Write every combined group for `node` in one transaction: the mappings
/// index, the mapping records and the aggregate numbers. A zero count means
/// the aggregation lost track of a node and is fatal.
fn persist_node_aggregates(store: &TreeStore, node: &PathKey, combined: &[MappedStats]) -> Result<()> {
    store.env().update(|txn| {
        for group in combined {
            if group.nums.count.is_zero() {
                return make_error_msg(
                    AggCode::ZERO_COUNT_GROUP,
                    format!("zero-count aggregate group at node {node}"),
                );
            }
            for (sm_key, sm) in &group.mappings {
                TreeStore::put_node_aggregate(txn, node, sm_key, sm, &group.nums)?;
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::NodeStats;
    use crate::store::TreeStore;
    use treestat_kv::KvOptions;

    fn temp_store() -> (tempfile::TempDir, TreeStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TreeStore::open(&KvOptions::new(dir.path().join("store.redb"))).unwrap();
        (dir, store)
    }

    fn nums(size: u64, count: u64) -> AggregateStats {
        AggregateStats {
            size: BigNum::from_u64(size),
            count: BigNum::from_u64(count),
            ..AggregateStats::zero()
        }
    }

    fn mapped(sm: StatMapping, stats: AggregateStats) -> MappedStats {
        let mut mappings = BTreeMap::new();
        mappings.insert(sm.key(), sm);
        MappedStats {
            mappings,
            nums: stats,
        }
    }

    #[test]
    fn test_elapsed_clamps_future_events() {
        assert_eq!(elapsed_secs(1000, 1200), BigNum::new());
        assert_eq!(elapsed_secs(1000, 400), BigNum::from_u64(600));
        assert!(elapsed_secs(i64::MAX, i64::MIN).compare(&BigNum::new()).is_gt());
    }

    #[test]
    fn test_node_local_stats_mapping_count() {
        let (_dir, store) = temp_store();
        store
            .create_tree_node(
                "/d/x.bam",
                NodeStats {
                    size: 100,
                    uid: 10,
                    gid: 100,
                    atime: 0,
                    mtime: 0,
                    ctime: 0,
                    file_type: b'f',
                },
            )
            .unwrap();

        let local = node_local_stats(&store, &path_key("/d/x.bam"), 10_000).unwrap();
        // {*, 10} x {*, 100} x {*, bam, file} = 12 mappings.
        assert_eq!(local.mappings.len(), 12);
        assert_eq!(local.nums.count, BigNum::from_u64(1));
        assert_eq!(local.nums.size, BigNum::from_u64(100));
        assert_eq!(
            local.nums.create_cost,
            BigNum::mul(&BigNum::from_u64(100), &BigNum::from_u64(10_000))
        );
    }

    #[test]
    fn test_combine_sums_shared_mappings() {
        let star = StatMapping::new("*", "*", "*");
        let bam = StatMapping::new("10", "100", "bam");
        let a = mapped(star.clone(), nums(100, 1));
        let b = mapped(star.clone(), nums(200, 1));
        let c = mapped(bam.clone(), nums(100, 1));

        let combined = combine(vec![a, b, c]);
        assert_eq!(combined.len(), 2);

        let star_group = combined
            .iter()
            .find(|g| g.mappings.contains_key(&star.key()))
            .unwrap();
        assert_eq!(star_group.nums.size, BigNum::from_u64(300));
        assert_eq!(star_group.nums.count, BigNum::from_u64(2));

        let bam_group = combined
            .iter()
            .find(|g| g.mappings.contains_key(&bam.key()))
            .unwrap();
        assert_eq!(bam_group.nums.count, BigNum::from_u64(1));
    }

    #[test]
    fn test_combine_splits_multi_mapping_input() {
        // One in-flight value filed under two mappings becomes two groups
        // carrying the same numbers.
        let m1 = StatMapping::new("*", "*", "*");
        let m2 = StatMapping::new("*", "*", "file");
        let mut mappings = BTreeMap::new();
        mappings.insert(m1.key(), m1);
        mappings.insert(m2.key(), m2);
        let input = MappedStats {
            mappings,
            nums: nums(50, 1),
        };

        let combined = combine(vec![input]);
        assert_eq!(combined.len(), 2);
        for group in &combined {
            assert_eq!(group.mappings.len(), 1);
            assert_eq!(group.nums.size, BigNum::from_u64(50));
        }
    }

    #[test]
    fn test_combine_orders_groups_by_key() {
        let a = mapped(StatMapping::new("9", "9", "zzz"), nums(1, 1));
        let b = mapped(StatMapping::new("1", "1", "aaa"), nums(2, 1));
        let combined = combine(vec![a, b]);
        let keys: Vec<_> = combined
            .iter()
            .map(|g| *g.mappings.keys().next().unwrap())
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_persist_rejects_zero_count() {
        let (_dir, store) = temp_store();
        let group = mapped(StatMapping::new("*", "*", "*"), nums(10, 0));
        let err =
            persist_node_aggregates(&store, &path_key("/"), &[group]).unwrap_err();
        assert_eq!(err.code(), AggCode::ZERO_COUNT_GROUP);
    }
}
