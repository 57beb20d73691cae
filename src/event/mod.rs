//! Event module - append-only execution audit trail
//!
//! - `log`: Event envelope, EventKind variants, thread-safe EventLog

mod log;

pub use log::{Event, EventKind, EventLog};
