//! Local implementations of the transfer and hand-off collaborators.
//!
//! `LocalStorageSink` stores blobs under a filesystem root. `SqliteStore`
//! backs both the record registry and the deal store with one database.

pub mod deal_store;
pub mod local_sink;
pub mod sqlite_store;

pub use deal_store::*;
pub use local_sink::*;
pub use sqlite_store::*;
