//! Binding module - placeholder substitution between tasks
//!
//! Resolves `${task.field}` references inside value trees against the
//! run's results map:
//! - `template`: the resolver itself plus reference extraction
//!
//! Resolution is pure: no clock, no randomness, no I/O. A reference
//! that cannot be resolved keeps its literal text - a deliberate
//! fall-through, not an error.

mod template;

pub use template::{extract_refs, resolve_params, resolve_str, resolve_value};
