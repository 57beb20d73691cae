//! Store module - per-run results map
//!
//! - `datastore`: TaskState, TaskRecord, DataStore

mod datastore;

pub use datastore::{now_ms, DataStore, TaskRecord, TaskState};
