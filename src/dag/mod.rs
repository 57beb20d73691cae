//! DAG module - dependency graph over task specs
//!
//! - `graph`: TaskGraph adjacency built from `depends_on` edges,
//!   cycle detection, reachability
//! - `validate`: up-front workflow validation (names, deps, functions,
//!   acyclicity)

mod graph;
mod validate;

pub use graph::TaskGraph;
pub use validate::validate_spec;
