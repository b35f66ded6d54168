//! Table operations shared by every store consumer.
//!
//! Single-value tables map a byte key to one byte value; multimap tables
//! bind a key to a set of equal-width values (duplicate inserts are
//! reported, not errors). Not-found is always `Ok(None)` / an empty vec.

use redb::{
    MultimapTable, MultimapTableDefinition, ReadableMultimapTable, ReadableTable,
    ReadableTableMetadata, Table, TableDefinition, WriteTransaction,
};
use treestat_types::{Result, StoreCode};

use crate::{storage_error, table_error};

/// Byte-keyed, byte-valued single-value table definition.
pub type ByteTable = TableDefinition<'static, &'static [u8], &'static [u8]>;

/// Byte-keyed multimap table definition holding sets of byte values.
pub type ByteMultimap = MultimapTableDefinition<'static, &'static [u8], &'static [u8]>;

/// Look up a key. Absent keys are `Ok(None)`.
pub fn get<T>(table: &T, key: &[u8]) -> Result<Option<Vec<u8>>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let guard = table
        .get(key)
        .map_err(|e| storage_error(StoreCode::GET_ERROR, e))?;
    Ok(guard.map(|g| g.value().to_vec()))
}

/// Insert a value. With `overwrite` false an existing key is left untouched
/// and `Ok(false)` is returned; otherwise the value is written and the call
/// returns `Ok(true)`.
pub fn put(
    table: &mut Table<&'static [u8], &'static [u8]>,
    key: &[u8],
    value: &[u8],
    overwrite: bool,
) -> Result<bool> {
    if !overwrite {
        let exists = table
            .get(key)
            .map_err(|e| storage_error(StoreCode::GET_ERROR, e))?
            .is_some();
        if exists {
            return Ok(false);
        }
    }
    table
        .insert(key, value)
        .map_err(|e| storage_error(StoreCode::PUT_ERROR, e))?;
    Ok(true)
}

/// Add a value to the set under `key`. Returns `Ok(true)` when the value is
/// new and `Ok(false)` when the pair already existed (a no-op, never an
/// error).
pub fn add_to_set(
    table: &mut MultimapTable<&'static [u8], &'static [u8]>,
    key: &[u8],
    value: &[u8],
) -> Result<bool> {
    let already_present = table
        .insert(key, value)
        .map_err(|e| storage_error(StoreCode::PUT_ERROR, e))?;
    Ok(!already_present)
}

/// Collect every value stored under `key`, in the table's value order.
pub fn set_values<T>(table: &T, key: &[u8]) -> Result<Vec<Vec<u8>>>
where
    T: ReadableMultimapTable<&'static [u8], &'static [u8]>,
{
    let mut out = Vec::new();
    let entries = table
        .get(key)
        .map_err(|e| storage_error(StoreCode::GET_ERROR, e))?;
    for entry in entries {
        let guard = entry.map_err(|e| storage_error(StoreCode::ITERATE_ERROR, e))?;
        out.push(guard.value().to_vec());
    }
    Ok(out)
}

/// Number of entries in a table.
pub fn len<T: ReadableTableMetadata>(table: &T) -> Result<u64> {
    table
        .len()
        .map_err(|e| storage_error(StoreCode::GET_ERROR, e))
}

/// Drop every entry in a single-value table, leaving it open and empty.
pub fn reset_table(txn: &WriteTransaction, def: ByteTable) -> Result<()> {
    txn.delete_table(def).map_err(table_error)?;
    txn.open_table(def).map_err(table_error)?;
    Ok(())
}

/// Drop every entry in a multimap table, leaving it open and empty.
pub fn reset_multimap(txn: &WriteTransaction, def: ByteMultimap) -> Result<()> {
    txn.delete_multimap_table(def).map_err(table_error)?;
    txn.open_multimap_table(def).map_err(table_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KvEnv, KvOptions};

    const T: ByteTable = TableDefinition::new("values");
    const M: ByteMultimap = MultimapTableDefinition::new("sets");

    fn temp_env() -> (tempfile::TempDir, KvEnv) {
        let dir = tempfile::tempdir().unwrap();
        let env = KvEnv::open(&KvOptions::new(dir.path().join("kv.redb"))).unwrap();
        (dir, env)
    }

    #[test]
    fn test_get_missing_is_none() {
        let (_dir, env) = temp_env();
        let got = env
            .update(|txn| {
                let t = txn.open_table(T).map_err(table_error)?;
                get(&t, b"nope")
            })
            .unwrap();
        assert_eq!(got, None);
    }

    #[test]
    fn test_put_without_overwrite_keeps_existing() {
        let (_dir, env) = temp_env();
        env.update(|txn| {
            let mut t = txn.open_table(T).map_err(table_error)?;
            assert!(put(&mut t, b"k", b"first", false)?);
            assert!(!put(&mut t, b"k", b"second", false)?);
            assert!(put(&mut t, b"k", b"third", true)?);
            Ok(())
        })
        .unwrap();

        let got = env
            .view(|txn| {
                let t = txn.open_table(T).map_err(table_error)?;
                get(&t, b"k")
            })
            .unwrap();
        assert_eq!(got, Some(b"third".to_vec()));
    }

    #[test]
    fn test_multimap_dup_insert_is_noop() {
        let (_dir, env) = temp_env();
        env.update(|txn| {
            let mut m = txn.open_multimap_table(M).map_err(table_error)?;
            assert!(add_to_set(&mut m, b"dir", b"child-a")?);
            assert!(add_to_set(&mut m, b"dir", b"child-b")?);
            assert!(!add_to_set(&mut m, b"dir", b"child-a")?);
            Ok(())
        })
        .unwrap();

        let values = env
            .view(|txn| {
                let m = txn.open_multimap_table(M).map_err(table_error)?;
                set_values(&m, b"dir")
            })
            .unwrap();
        assert_eq!(values.len(), 2);
        assert!(values.contains(&b"child-a".to_vec()));
        assert!(values.contains(&b"child-b".to_vec()));
    }

    #[test]
    fn test_multimap_missing_key_is_empty() {
        let (_dir, env) = temp_env();
        let values = env
            .update(|txn| {
                let m = txn.open_multimap_table(M).map_err(table_error)?;
                set_values(&m, b"nothing")
            })
            .unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn test_reset_drops_all_entries() {
        let (_dir, env) = temp_env();
        env.update(|txn| {
            let mut t = txn.open_table(T).map_err(table_error)?;
            put(&mut t, b"a", b"1", true)?;
            put(&mut t, b"b", b"2", true)?;
            let mut m = txn.open_multimap_table(M).map_err(table_error)?;
            add_to_set(&mut m, b"k", b"v")?;
            Ok(())
        })
        .unwrap();

        env.update(|txn| {
            reset_table(txn, T)?;
            reset_multimap(txn, M)
        })
        .unwrap();

        env.view(|txn| {
            let t = txn.open_table(T).map_err(table_error)?;
            assert_eq!(len(&t)?, 0);
            let m = txn.open_multimap_table(M).map_err(table_error)?;
            assert!(set_values(&m, b"k")?.is_empty());
            Ok(())
        })
        .unwrap();
    }
}
