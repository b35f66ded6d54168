//! Engine settings.
//!
//! One flat struct covers every recognised option; the binary fills it from
//! flags or a TOML file. Serde defaults keep a partial config file valid.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use treestat_types::{make_error_msg, Result, StatusCode};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Filesystem path of the store environment.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Store cache budget in bytes.
    #[serde(default = "default_max_map_size")]
    pub max_map_size: usize,

    /// Seconds since epoch used as the cost reference time.
    #[serde(default = "default_cost_reference_time")]
    pub cost_reference_time: i64,

    /// Parser parallelism for the ingest phase.
    #[serde(default = "default_input_workers")]
    pub input_workers: usize,

    /// Worker parallelism for the finalize phase.
    #[serde(default = "default_finalize_workers")]
    pub finalize_workers: usize,

    /// Dispatch at most this many input lines; -1 means unbounded.
    #[serde(default = "default_unbounded")]
    pub stop_input_after_n_lines: i64,

    /// Cancel finalize after this many nodes; -1 means unbounded.
    #[serde(default = "default_unbounded")]
    pub stop_finalize_after_n_nodes: i64,

    /// Info-log every N created nodes during ingest.
    #[serde(default = "default_info_every")]
    pub nodes_created_info_every_n: u64,

    /// Info-log every N finalized nodes during aggregation.
    #[serde(default = "default_info_every")]
    pub nodes_finalized_info_every_n: u64,

    /// Path of the gzip dump to ingest.
    #[serde(default)]
    pub input_path: Option<PathBuf>,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("/tmp/treestat.redb")
}

fn default_max_map_size() -> usize {
    1 << 30
}

fn default_cost_reference_time() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(_) => 0,
    }
}

fn default_input_workers() -> usize {
    2
}

fn default_finalize_workers() -> usize {
    10
}

fn default_unbounded() -> i64 {
    -1
}

fn default_info_every() -> u64 {
    10_000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            max_map_size: default_max_map_size(),
            cost_reference_time: default_cost_reference_time(),
            input_workers: default_input_workers(),
            finalize_workers: default_finalize_workers(),
            stop_input_after_n_lines: default_unbounded(),
            stop_finalize_after_n_nodes: default_unbounded(),
            nodes_created_info_every_n: default_info_every(),
            nodes_finalized_info_every_n: default_info_every(),
            input_path: None,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.input_workers == 0 {
            return make_error_msg(StatusCode::INVALID_CONFIG, "input_workers must be > 0");
        }
        if self.finalize_workers == 0 {
            return make_error_msg(StatusCode::INVALID_CONFIG, "finalize_workers must be > 0");
        }
        if self.nodes_created_info_every_n == 0 || self.nodes_finalized_info_every_n == 0 {
            return make_error_msg(StatusCode::INVALID_CONFIG, "info intervals must be > 0");
        }
        Ok(())
    }

    pub fn kv_options(&self) -> treestat_kv::KvOptions {
        treestat_kv::KvOptions::new(&self.store_path).cache_bytes(self.max_map_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let s = Settings::default();
        s.validate().unwrap();
        assert_eq!(s.input_workers, 2);
        assert_eq!(s.finalize_workers, 10);
        assert_eq!(s.stop_input_after_n_lines, -1);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let s = Settings {
            input_workers: 0,
            ..Settings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_reference_time_is_recent() {
        let s = Settings::default();
        assert!(s.cost_reference_time > 1_600_000_000);
    }
}
