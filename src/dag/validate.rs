//! Workflow validation - runs once before any task is dispatched
//!
//! Checks, in order:
//! 1. task names are unique (the input node name counts)
//! 2. every `depends_on` names an existing task or the input node
//! 3. every runnable task names a function, registered when a registry
//!    is supplied
//! 4. the dependency graph is acyclic
//!
//! A failed check aborts the run before dispatch; no task leaves PENDING.

use rustc_hash::FxHashSet;

use crate::ast::{FlowSpec, NodeKind};
use crate::error::WeftError;
use crate::registry::FunctionRegistry;

use super::graph::TaskGraph;

pub fn validate_spec(
    spec: &FlowSpec,
    graph: &TaskGraph,
    registry: Option<&FunctionRegistry>,
) -> Result<(), WeftError> {
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    seen.insert(spec.input.name.as_str());

    for task in &spec.tasks {
        if !seen.insert(task.name.as_str()) {
            return Err(WeftError::DuplicateTask {
                name: task.name.clone(),
            });
        }
    }

    for task in &spec.tasks {
        for dep in &task.depends_on {
            if !seen.contains(dep.as_str()) {
                return Err(WeftError::MissingDependency {
                    task: task.name.clone(),
                    dep: dep.clone(),
                });
            }
        }
    }

    for task in spec.runnable_tasks() {
        if task.func.is_empty() {
            return Err(WeftError::ValidationError {
                reason: format!("task '{}' has no function", task.name),
            });
        }
        if let Some(registry) = registry {
            if !registry.contains(&task.func) {
                return Err(WeftError::UnknownFunction {
                    task: task.name.clone(),
                    func: task.func.clone(),
                });
            }
        }
    }

    // Entries typed start/end are structural markers, not work
    for task in &spec.tasks {
        if task.kind != NodeKind::Task && !task.custom_vars.is_empty() {
            return Err(WeftError::ValidationError {
                reason: format!(
                    "node '{}' of type '{:?}' cannot carry custom_vars",
                    task.name, task.kind
                ),
            });
        }
    }

    graph.detect_cycles()
}
