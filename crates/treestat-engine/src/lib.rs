//! The treestat engine: ingest a filesystem-inventory dump into an
//! embedded store, roll up per-directory usage by (user, group, tag), and
//! answer read-only queries over the result.

pub mod aggregate;
pub mod cancel;
pub mod config;
pub mod driver;
pub mod ingest;
pub mod keys;
pub mod query;
pub mod records;
pub mod schema;
pub mod store;
pub mod tags;

pub use config::Settings;
pub use driver::DriverState;
pub use store::TreeStore;
pub use treestat_kv::KvOptions;
