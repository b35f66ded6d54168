//! Ingest phase: parse the dump and materialise the tree.
//!
//! A single producer decompresses the input and feeds a bounded line
//! channel; parser workers consume independently, each line becoming one
//! write transaction (node + missing ancestors + edge). Malformed input is
//! fatal for the phase: the first error trips a shared flag, the producer
//! stops dispatching, the remaining workers drain and exit, and the first
//! error is surfaced after every worker has joined.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::bounded;
use flate2::read::GzDecoder;
use treestat_types::{make_error_msg, ParseCode, Result, StatusCode};
use treestat_utils::coding::base64_decode;

use crate::config::Settings;
use crate::records::NodeStats;
use crate::store::TreeStore;

/// What the phase did, for the driver's log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub lines_dispatched: u64,
    pub nodes_created: u64,
}

/// Run the ingest phase. Resets the tree tables first so a re-run starts
/// from scratch.
pub fn process_input(store: &TreeStore, settings: &Settings) -> Result<IngestSummary> {
    let input_path = settings.input_path.as_deref().ok_or_else(|| {
        treestat_types::Status::with_message(StatusCode::INVALID_CONFIG, "input path not set")
    })?;

    store.reset_tree()?;

    let workers = settings.input_workers;
    let (line_tx, line_rx) = bounded::<String>(workers * 10);
    let failed = AtomicBool::new(false);
    let created_total = AtomicU64::new(0);

    tracing::info!(workers, input = %input_path.display(), "starting input workers");

    let dispatched = thread::scope(|scope| -> Result<u64> {
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let line_rx = line_rx.clone();
            let failed = &failed;
            let created_total = &created_total;
            handles.push(scope.spawn(move || -> Result<()> {
                for line in line_rx.iter() {
                    if failed.load(Ordering::Relaxed) {
                        break;
                    }
                    if let Err(status) = process_line(
                        store,
                        &line,
                        created_total,
                        settings.nodes_created_info_every_n,
                    ) {
                        failed.store(true, Ordering::Relaxed);
                        tracing::error!(worker_id, error = %status, "input worker failed");
                        return Err(status);
                    }
                }
                Ok(())
            }));
        }
        drop(line_rx);

        let produced = dispatch_lines(
            input_path,
            &line_tx,
            &failed,
            settings.stop_input_after_n_lines,
        );
        drop(line_tx);

        let mut first_err = None;
        for handle in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(status)) => {
                    first_err.get_or_insert(status);
                }
                Err(_) => {
                    first_err.get_or_insert(treestat_types::Status::with_message(
                        StatusCode::FOUND_BUG,
                        "input worker panicked",
                    ));
                }
            }
        }
        match first_err {
            Some(status) => Err(status),
            None => produced,
        }
    })?;

    let summary = IngestSummary {
        lines_dispatched: dispatched,
        nodes_created: created_total.load(Ordering::Relaxed),
    };
    tracing::info!(
        lines = summary.lines_dispatched,
        nodes = summary.nodes_created,
        "input workers finished"
    );
    Ok(summary)
}

/// Read lines from the gzip stream and dispatch them until EOF, the line
/// bound, a worker failure, or all workers having exited.
fn dispatch_lines(
    input_path: &Path,
    line_tx: &crossbeam_channel::Sender<String>,
    failed: &AtomicBool,
    stop_after: i64,
) -> Result<u64> {
    let file = File::open(input_path).map_err(|e| {
        treestat_types::Status::with_message(
            ParseCode::INPUT_IO,
            format!("{}: {}", input_path.display(), e),
        )
    })?;
    let reader = BufReader::new(GzDecoder::new(file));

    let mut dispatched = 0u64;
    for line in reader.lines() {
        if failed.load(Ordering::Relaxed) {
            break;
        }
        if stop_after >= 0 && dispatched >= stop_after as u64 {
            tracing::warn!(stop_after, "truncating input at configured line bound");
            break;
        }
        let line = line.map_err(|e| {
            treestat_types::Status::with_message(ParseCode::INPUT_IO, e.to_string())
        })?;
        if line_tx.send(line).is_err() {
            // Every worker has exited; their join results carry the reason.
            break;
        }
        dispatched += 1;
    }
    Ok(dispatched)
}

fn process_line(
    store: &TreeStore,
    line: &str,
    created_total: &AtomicU64,
    info_every: u64,
) -> Result<()> {
    let (path, stats) = parse_line(line)?;
    let created = store.create_tree_node(&path, stats)?;
    if created > 0 {
        let before = created_total.fetch_add(created, Ordering::Relaxed);
        let after = before + created;
        if before / info_every != after / info_every {
            tracing::info!(nodes_created = after, "created nodes");
        }
    }
    Ok(())
}

/// Split one dump line into the node path and its stats.
///
/// Eleven tab-separated fields; only the first eight are used and anything
/// after them is ignored, but the first eight must parse.
fn parse_line(line: &str) -> Result<(String, NodeStats)> {
    let fields: Vec<&str> = line.splitn(11, '\t').collect();
    if fields.len() < 8 {
        return make_error_msg(
            ParseCode::BAD_LINE,
            format!("expected at least 8 fields, got {}", fields.len()),
        );
    }

    let path_bytes = base64_decode(fields[0]).ok_or_else(|| {
        treestat_types::Status::with_message(
            ParseCode::BAD_BASE64,
            format!("bad base64 path '{}'", fields[0]),
        )
    })?;
    let path = String::from_utf8(path_bytes).map_err(|_| {
        treestat_types::Status::with_message(ParseCode::BAD_UTF8, "path is not UTF-8")
    })?;

    let stats = NodeStats {
        size: parse_u64(fields[1], "size")?,
        uid: parse_u64(fields[2], "uid")?,
        gid: parse_u64(fields[3], "gid")?,
        atime: parse_i64(fields[4], "atime")?,
        mtime: parse_i64(fields[5], "mtime")?,
        ctime: parse_i64(fields[6], "ctime")?,
        file_type: fields[7].bytes().next().ok_or_else(|| {
            treestat_types::Status::with_message(ParseCode::BAD_FIELD, "empty file type")
        })?,
    };
    Ok((path, stats))
}

fn parse_u64(field: &str, what: &str) -> Result<u64> {
    field.parse::<u64>().map_err(|_| {
        treestat_types::Status::with_message(
            ParseCode::BAD_FIELD,
            format!("bad {what} '{field}'"),
        )
    })
}

fn parse_i64(field: &str, what: &str) -> Result<i64> {
    field.parse::<i64>().map_err(|_| {
        treestat_types::Status::with_message(
            ParseCode::BAD_FIELD,
            format!("bad {what} '{field}'"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use treestat_utils::coding::base64_encode;

    fn line_for(path: &str, size: u64, file_type: char) -> String {
        format!(
            "{}\t{}\t10\t100\t1000\t2000\t3000\t{}\t111\t1\t42",
            base64_encode(path.as_bytes()),
            size,
            file_type
        )
    }

    #[test]
    fn test_parse_line_full() {
        let (path, stats) = parse_line(&line_for("/a/b.bam", 100, 'f')).unwrap();
        assert_eq!(path, "/a/b.bam");
        assert_eq!(stats.size, 100);
        assert_eq!(stats.uid, 10);
        assert_eq!(stats.gid, 100);
        assert_eq!(stats.atime, 1000);
        assert_eq!(stats.mtime, 2000);
        assert_eq!(stats.ctime, 3000);
        assert_eq!(stats.file_type, b'f');
    }

    #[test]
    fn test_parse_line_ignores_trailing_fields() {
        // Device field carrying tabs must not break the first eight.
        let line = format!(
            "{}\t1\t2\t3\t4\t5\t6\td\tinode\tnlink\tdev\twith\textra",
            base64_encode(b"/x")
        );
        let (path, stats) = parse_line(&line).unwrap();
        assert_eq!(path, "/x");
        assert_eq!(stats.file_type, b'd');
    }

    #[test]
    fn test_parse_line_negative_times() {
        let line = format!("{}\t1\t2\t3\t-4\t-5\t-6\tf\t0\t0\t0", base64_encode(b"/x"));
        let (_, stats) = parse_line(&line).unwrap();
        assert_eq!(stats.atime, -4);
        assert_eq!(stats.ctime, -6);
    }

    #[test]
    fn test_parse_line_too_few_fields() {
        let err = parse_line("AAAA\t1\t2").unwrap_err();
        assert_eq!(err.code(), ParseCode::BAD_LINE);
    }

    #[test]
    fn test_parse_line_bad_base64() {
        let err = parse_line("!!!\t1\t2\t3\t4\t5\t6\tf\t0\t0\t0").unwrap_err();
        assert_eq!(err.code(), ParseCode::BAD_BASE64);
    }

    #[test]
    fn test_parse_line_bad_number() {
        let line = format!("{}\tnope\t2\t3\t4\t5\t6\tf\t0\t0\t0", base64_encode(b"/x"));
        let err = parse_line(&line).unwrap_err();
        assert_eq!(err.code(), ParseCode::BAD_FIELD);

        let line = format!("{}\t-1\t2\t3\t4\t5\t6\tf\t0\t0\t0", base64_encode(b"/x"));
        assert_eq!(parse_line(&line).unwrap_err().code(), ParseCode::BAD_FIELD);
    }
}
