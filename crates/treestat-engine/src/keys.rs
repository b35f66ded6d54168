//! Content-derived 16-byte identifiers.
//!
//! Paths, stat mappings and aggregates are all addressed by murmur3 x64
//! 128-bit digests. The aggregate key hashes the lowercase-hex rendering of
//! its two component digests; that stringification is part of the on-disk
//! contract and must not change.

use std::fmt;

use treestat_types::{Result, StatusCode};
use treestat_utils::coding::hex_encode;
use treestat_utils::murmur3::murmurhash3_x64_128_bytes;

pub const DIGEST_LEN: usize = 16;

/// A 16-byte content-derived identifier. Ordering is byte-lexicographic.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Digest([u8; DIGEST_LEN]);

/// Digest of an absolute path.
pub type PathKey = Digest;

/// Digest of a `user|group|tag` stat mapping.
pub type StatMappingKey = Digest;

/// Digest addressing one (node, stat mapping) aggregate record.
pub type AggregateKey = Digest;

impl Digest {
    /// The all-zero digest; used as the synthetic root's parent reference.
    pub fn zero() -> Self {
        Self([0u8; DIGEST_LEN])
    }

    pub fn from_array(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; DIGEST_LEN] = bytes.try_into().map_err(|_| {
            treestat_types::Status::with_message(
                StatusCode::DATA_CORRUPTION,
                format!("digest must be {} bytes, got {}", DIGEST_LEN, bytes.len()),
            )
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_array(self) -> [u8; DIGEST_LEN] {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex_encode(&self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; DIGEST_LEN]
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Digest of an absolute path string.
pub fn path_key(path: &str) -> PathKey {
    Digest(murmurhash3_x64_128_bytes(path.as_bytes(), 0))
}

/// Digest of a (user, group, tag) triple, joined with `|`.
pub fn stat_mapping_key(user: &str, group: &str, tag: &str) -> StatMappingKey {
    let joined = format!("{user}|{group}|{tag}");
    Digest(murmurhash3_x64_128_bytes(joined.as_bytes(), 0))
}

/// Digest addressing the aggregate record for (node, stat mapping).
pub fn aggregate_key(node: &PathKey, sm: &StatMappingKey) -> AggregateKey {
    let mut rendered = String::with_capacity(DIGEST_LEN * 4);
    rendered.push_str(&node.to_hex());
    rendered.push_str(&sm.to_hex());
    Digest(murmurhash3_x64_128_bytes(rendered.as_bytes(), 0))
}

/// Make an error for a digest that should exist but does not.
pub fn missing(kind: &str, key: &Digest) -> treestat_types::Status {
    treestat_types::Status::with_message(
        treestat_types::TreeCode::NODE_NOT_FOUND,
        format!("{kind} {key} not in store"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_key_deterministic() {
        assert_eq!(path_key("/a/b"), path_key("/a/b"));
        assert_ne!(path_key("/a/b"), path_key("/a/c"));
    }

    #[test]
    fn test_digest_roundtrip() {
        let k = path_key("/");
        let back = Digest::from_bytes(k.as_bytes()).unwrap();
        assert_eq!(k, back);
        assert!(Digest::from_bytes(b"short").is_err());
    }

    #[test]
    fn test_zero_digest() {
        assert!(Digest::zero().is_zero());
        assert!(!path_key("/").is_zero());
    }

    #[test]
    fn test_stat_mapping_key_separator_matters() {
        // "a|b" + "c" and "a" + "b|c" must not collide.
        assert_ne!(
            stat_mapping_key("a|b", "c", "*"),
            stat_mapping_key("a", "b|c", "*")
        );
    }

    #[test]
    fn test_aggregate_key_uses_hex_rendering() {
        let node = path_key("/a");
        let sm = stat_mapping_key("*", "*", "*");
        let expected = Digest(murmurhash3_x64_128_bytes(
            format!("{}{}", node.to_hex(), sm.to_hex()).as_bytes(),
            0,
        ));
        assert_eq!(aggregate_key(&node, &sm), expected);
    }

    #[test]
    fn test_hex_is_lowercase_32_chars() {
        let hex = path_key("/x").to_hex();
        assert_eq!(hex.len(), 32);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_ordering_is_byte_lexicographic() {
        let a = Digest::from_array([0u8; 16]);
        let mut high = [0u8; 16];
        high[0] = 1;
        let b = Digest::from_array(high);
        assert!(a < b);
    }
}
