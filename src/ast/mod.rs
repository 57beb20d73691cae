//! AST module - parsed workflow description types
//!
//! Contains the Rust types for the declarative workflow document:
//! - `flow`: FlowSpec, TaskSpec, IoNode, Metadata
//!
//! These types represent the "what" - static structure parsed from
//! YAML or JSON. For runtime execution, see the `runtime` module.

mod flow;

pub use flow::{FlowSpec, IoNode, Metadata, NodeKind, TaskSpec, DEFAULT_TASK_TIMEOUT_SECS};
