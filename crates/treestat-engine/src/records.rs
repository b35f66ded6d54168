//! Persistent record types and their canonical binary codecs.
//!
//! Every record has one deterministic encoding: strings carry a varint
//! length prefix, fixed-width integers are little-endian, and aggregate
//! numbers serialise as varint-length-prefixed minimum-width big-endian
//! byte strings. Decoding rejects trailing garbage so a stored record is
//! always byte-for-byte canonical.

use treestat_types::{make_error_msg, Result, StatusCode};
use treestat_utils::bignum::BigNum;
use treestat_utils::varint::{decode_varint, encode_varint};

use crate::keys::{stat_mapping_key, Digest, PathKey, StatMappingKey, DIGEST_LEN};

/// Encoded size of [`NodeStats`]: six 8-byte integers plus the type byte.
pub const NODE_STATS_LEN: usize = 49;

/// Per-node stat fields taken from one dump line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeStats {
    pub size: u64,
    pub uid: u64,
    pub gid: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub file_type: u8,
}

impl NodeStats {
    /// Zero stats with the directory type byte, used for ancestors
    /// materialised before their own dump line arrives.
    pub fn directory_placeholder() -> Self {
        Self {
            file_type: crate::tags::FILE_TYPE_DIRECTORY,
            ..Self::default()
        }
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.size.to_le_bytes());
        buf.extend_from_slice(&self.uid.to_le_bytes());
        buf.extend_from_slice(&self.gid.to_le_bytes());
        buf.extend_from_slice(&self.atime.to_le_bytes());
        buf.extend_from_slice(&self.mtime.to_le_bytes());
        buf.extend_from_slice(&self.ctime.to_le_bytes());
        buf.push(self.file_type);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(NODE_STATS_LEN);
        self.encode_into(&mut buf);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != NODE_STATS_LEN {
            return make_error_msg(
                StatusCode::DATA_CORRUPTION,
                format!("node stats must be {NODE_STATS_LEN} bytes, got {}", buf.len()),
            );
        }
        let u = |at: usize| u64::from_le_bytes(buf[at..at + 8].try_into().unwrap());
        let i = |at: usize| i64::from_le_bytes(buf[at..at + 8].try_into().unwrap());
        Ok(Self {
            size: u(0),
            uid: u(8),
            gid: u(16),
            atime: i(24),
            mtime: i(32),
            ctime: i(40),
            file_type: buf[48],
        })
    }
}

/// One node of the materialised tree: the absolute path it was recorded
/// under, its parent's path digest, and its stats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub name: String,
    pub parent_key: PathKey,
    pub stats: NodeStats,
}

impl TreeNode {
    pub fn is_directory(&self) -> bool {
        self.stats.file_type == crate::tags::FILE_TYPE_DIRECTORY
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(self.name.len() + 2 + DIGEST_LEN + NODE_STATS_LEN);
        encode_string(&self.name, &mut buf);
        buf.extend_from_slice(self.parent_key.as_bytes());
        self.stats.encode_into(&mut buf);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let (name, mut pos) = decode_string(buf)?;
        if buf.len() < pos + DIGEST_LEN {
            return make_error_msg(StatusCode::DATA_CORRUPTION, "tree node truncated at parent");
        }
        let parent_key = Digest::from_bytes(&buf[pos..pos + DIGEST_LEN])?;
        pos += DIGEST_LEN;
        let stats = NodeStats::decode(&buf[pos..])?;
        Ok(Self {
            name,
            parent_key,
            stats,
        })
    }
}

/// One (user, group, tag) aggregation axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatMapping {
    pub user: String,
    pub group: String,
    pub tag: String,
}

impl StatMapping {
    pub fn new(user: impl Into<String>, group: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            group: group.into(),
            tag: tag.into(),
        }
    }

    pub fn key(&self) -> StatMappingKey {
        stat_mapping_key(&self.user, &self.group, &self.tag)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(self.user.len() + self.group.len() + self.tag.len() + 3);
        encode_string(&self.user, &mut buf);
        encode_string(&self.group, &mut buf);
        encode_string(&self.tag, &mut buf);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let (user, a) = decode_string(buf)?;
        let (group, b) = decode_string(&buf[a..])?;
        let (tag, c) = decode_string(&buf[a + b..])?;
        if a + b + c != buf.len() {
            return make_error_msg(StatusCode::DATA_CORRUPTION, "stat mapping has trailing bytes");
        }
        Ok(Self { user, group, tag })
    }
}

/// The five rolled-up numbers stored per (node, stat mapping).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AggregateStats {
    pub size: BigNum,
    pub count: BigNum,
    pub create_cost: BigNum,
    pub modify_cost: BigNum,
    pub access_cost: BigNum,
}

impl AggregateStats {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Component-wise sum.
    pub fn add_assign(&mut self, other: &AggregateStats) {
        self.size.add_assign(&other.size);
        self.count.add_assign(&other.count);
        self.create_cost.add_assign(&other.create_cost);
        self.modify_cost.add_assign(&other.modify_cost);
        self.access_cost.add_assign(&other.access_cost);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for num in [
            &self.size,
            &self.count,
            &self.create_cost,
            &self.modify_cost,
            &self.access_cost,
        ] {
            let bytes = num.to_bytes();
            encode_varint(bytes.len() as u64, &mut buf);
            buf.extend_from_slice(&bytes);
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut pos = 0usize;
        let mut nums = [BigNum::new(), BigNum::new(), BigNum::new(), BigNum::new(), BigNum::new()];
        for num in nums.iter_mut() {
            let (len, used) = decode_varint(&buf[pos..]).ok_or_else(|| {
                treestat_types::Status::with_message(
                    StatusCode::DATA_CORRUPTION,
                    "aggregate record truncated at length prefix",
                )
            })?;
            pos += used;
            let len = len as usize;
            if buf.len() < pos + len {
                return make_error_msg(StatusCode::DATA_CORRUPTION, "aggregate record truncated");
            }
            *num = BigNum::from_bytes(&buf[pos..pos + len]);
            pos += len;
        }
        if pos != buf.len() {
            return make_error_msg(StatusCode::DATA_CORRUPTION, "aggregate record has trailing bytes");
        }
        let [size, count, create_cost, modify_cost, access_cost] = nums;
        Ok(Self {
            size,
            count,
            create_cost,
            modify_cost,
            access_cost,
        })
    }
}

fn encode_string(s: &str, buf: &mut Vec<u8>) {
    encode_varint(s.len() as u64, buf);
    buf.extend_from_slice(s.as_bytes());
}

/// Decode one varint-prefixed string from the front of `buf`, returning the
/// string and the number of bytes consumed.
fn decode_string(buf: &[u8]) -> Result<(String, usize)> {
    let (len, used) = decode_varint(buf).ok_or_else(|| {
        treestat_types::Status::with_message(StatusCode::DATA_CORRUPTION, "bad string length prefix")
    })?;
    let len = len as usize;
    if buf.len() < used + len {
        return make_error_msg(StatusCode::DATA_CORRUPTION, "string truncated");
    }
    let s = std::str::from_utf8(&buf[used..used + len])
        .map_err(|_| {
            treestat_types::Status::with_message(StatusCode::DATA_CORRUPTION, "string is not UTF-8")
        })?
        .to_string();
    Ok((s, used + len))
}
