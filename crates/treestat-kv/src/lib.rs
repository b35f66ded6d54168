//! Embedded transactional store facade.
//!
//! Wraps a [`redb`] environment: single writer, many concurrent MVCC
//! readers, named tables plus dup-sorted multimap tables. Transactions are
//! scoped through [`KvEnv::view`] and [`KvEnv::update`] closures so commit
//! or abort happens on every exit path.

pub mod tables;

use std::path::{Path, PathBuf};

use redb::Database;
use treestat_types::{make_error_msg, Result, StoreCode};

pub use redb::{
    MultimapTable, MultimapTableDefinition, ReadTransaction, ReadableMultimapTable, ReadableTable,
    ReadableTableMetadata, Table, TableDefinition, WriteTransaction,
};

/// Options for opening a store environment.
#[derive(Debug, Clone)]
pub struct KvOptions {
    /// Filesystem path of the backing file; created when absent.
    pub path: PathBuf,
    /// Cache budget in bytes for the environment.
    pub cache_bytes: usize,
}

impl KvOptions {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            cache_bytes: 1 << 30,
        }
    }

    pub fn cache_bytes(mut self, bytes: usize) -> Self {
        self.cache_bytes = bytes;
        self
    }
}

/// An open store environment. Cheap to share behind an `Arc`; the store
/// serialises writers internally while readers proceed against snapshots.
pub struct KvEnv {
    db: Database,
}

impl KvEnv {
    /// Open or create the environment at the configured path. Reopening an
    /// existing environment is idempotent.
    pub fn open(opts: &KvOptions) -> Result<Self> {
        let db = Database::builder()
            .set_cache_size(opts.cache_bytes)
            .create(&opts.path)
            .map_err(|e| {
                treestat_types::Status::with_message(
                    StoreCode::OPEN_FAILED,
                    format!("{}: {}", opts.path.display(), e),
                )
            })?;
        tracing::info!(path = %opts.path.display(), "opened store environment");
        Ok(Self { db })
    }

    /// Run a read transaction. Readers see a consistent snapshot and never
    /// block the writer.
    pub fn view<T>(&self, f: impl FnOnce(&ReadTransaction) -> Result<T>) -> Result<T> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| txn_error("begin read", e))?;
        f(&txn)
    }

    /// Run a write transaction. Commits when the closure returns `Ok`,
    /// aborts when it returns `Err`. Write transactions are globally
    /// serialised; callers must not hold one across a channel operation.
    pub fn update<T>(&self, f: impl FnOnce(&WriteTransaction) -> Result<T>) -> Result<T> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| txn_error("begin write", e))?;
        match f(&txn) {
            Ok(value) => {
                txn.commit().map_err(|e| {
                    treestat_types::Status::with_message(StoreCode::COMMIT_FAILED, e.to_string())
                })?;
                Ok(value)
            }
            Err(status) => {
                // Abort failures are secondary to the original error.
                let _ = txn.abort();
                Err(status)
            }
        }
    }
}

fn txn_error(what: &str, err: redb::TransactionError) -> treestat_types::Status {
    treestat_types::Status::with_message(StoreCode::TXN_FAILED, format!("{what}: {err}"))
}

/// Map a table-open failure.
pub fn table_error(err: redb::TableError) -> treestat_types::Status {
    treestat_types::Status::with_message(StoreCode::TABLE_ERROR, err.to_string())
}

/// Map a storage-layer failure under the given code.
pub fn storage_error(
    code: treestat_types::status_code::status_code_t,
    err: redb::StorageError,
) -> treestat_types::Status {
    treestat_types::Status::with_message(code, err.to_string())
}

/// Reject obviously unusable options before touching the filesystem.
pub fn validate_options(opts: &KvOptions) -> Result<()> {
    if opts.path.as_os_str().is_empty() {
        return make_error_msg(StoreCode::OPEN_FAILED, "empty store path");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use treestat_types::StatusCode;

    const T: TableDefinition<&[u8], &[u8]> = TableDefinition::new("t");

    fn temp_env() -> (tempfile::TempDir, KvEnv) {
        let dir = tempfile::tempdir().unwrap();
        let env = KvEnv::open(&KvOptions::new(dir.path().join("kv.redb"))).unwrap();
        (dir, env)
    }

    #[test]
    fn test_update_commits_on_ok() {
        let (_dir, env) = temp_env();
        env.update(|txn| {
            let mut t = txn.open_table(T).map_err(table_error)?;
            tables::put(&mut t, b"k", b"v", true)?;
            Ok(())
        })
        .unwrap();

        let got = env
            .view(|txn| {
                let t = txn.open_table(T).map_err(table_error)?;
                tables::get(&t, b"k")
            })
            .unwrap();
        assert_eq!(got, Some(b"v".to_vec()));
    }

    #[test]
    fn test_update_aborts_on_err() {
        let (_dir, env) = temp_env();
        env.update(|txn| {
            let mut t = txn.open_table(T).map_err(table_error)?;
            tables::put(&mut t, b"k", b"v", true)?;
            Ok(())
        })
        .unwrap();

        let r: Result<()> = env.update(|txn| {
            let mut t = txn.open_table(T).map_err(table_error)?;
            tables::put(&mut t, b"k", b"overwritten", true)?;
            treestat_types::make_error(StatusCode::FOUND_BUG)
        });
        assert!(r.is_err());

        // The aborted write must not be visible.
        let got = env
            .view(|txn| {
                let t = txn.open_table(T).map_err(table_error)?;
                tables::get(&t, b"k")
            })
            .unwrap();
        assert_eq!(got, Some(b"v".to_vec()));
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let opts = KvOptions::new(dir.path().join("kv.redb"));
        {
            let env = KvEnv::open(&opts).unwrap();
            env.update(|txn| {
                let mut t = txn.open_table(T).map_err(table_error)?;
                tables::put(&mut t, b"persist", b"1", true)?;
                Ok(())
            })
            .unwrap();
        }
        let env = KvEnv::open(&opts).unwrap();
        let got = env
            .view(|txn| {
                let t = txn.open_table(T).map_err(table_error)?;
                tables::get(&t, b"persist")
            })
            .unwrap();
        assert_eq!(got, Some(b"1".to_vec()));
    }

    #[test]
    fn test_validate_options() {
        assert!(validate_options(&KvOptions::new("/tmp/x.redb")).is_ok());
        assert!(validate_options(&KvOptions::new("")).is_err());
    }
}
