//! Workflow description types
//!
//! Core document structure:
//! - `FlowSpec`: root description with input node, task specs, output node
//! - `TaskSpec`: one task (function, parameters, dependencies, timeout, retry)
//! - `IoNode`: the start/end nodes carrying literal input data and the
//!   placeholder-bearing output template
//!
//! Unknown top-level keys are preserved and ignored by the engine.

use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::WeftError;

/// Default per-invocation deadline when a task spec omits `timeout`
pub const DEFAULT_TASK_TIMEOUT_SECS: f64 = 30.0;

/// Workflow metadata - opaque to the engine except for `name`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Optional stable name used by the engine's workflow table
    #[serde(default)]
    pub name: Option<String>,
}

/// Node kind discriminator
///
/// Only `task` entries are dispatched; `start`/`end` mark the input and
/// output nodes of the document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    #[default]
    Task,
    Start,
    End,
}

/// The input or output node: a name plus a nested data mapping
///
/// For the input node `data` holds literal values; for the output node it
/// typically holds `${task.field}` placeholder references.
#[derive(Debug, Clone, Deserialize)]
pub struct IoNode {
    #[serde(default, rename = "type")]
    pub kind: NodeKind,
    pub name: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Declarative description of one task node
#[derive(Debug, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: NodeKind,
    /// Name of the registered function this task invokes
    #[serde(default)]
    pub func: String,
    /// Parameter templates: literals, placeholders, or nested containers
    #[serde(default)]
    pub custom_vars: Map<String, Value>,
    /// Names of tasks that must succeed before this task runs
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Per-invocation deadline in seconds (fractional allowed)
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    /// Extra attempts after the first failure
    #[serde(default)]
    pub retry: u32,
}

fn default_timeout() -> f64 {
    DEFAULT_TASK_TIMEOUT_SECS
}

impl TaskSpec {
    /// Deadline for one invocation attempt
    pub fn timeout_duration(&self) -> Duration {
        // Guard against zero/negative timeouts from hand-written documents
        Duration::from_secs_f64(self.timeout.max(0.001))
    }

    /// Total attempt budget (first attempt + retries)
    pub fn max_attempts(&self) -> u32 {
        self.retry.saturating_add(1)
    }
}

/// Raw document shape as parsed from YAML/JSON
#[derive(Debug, Deserialize)]
struct FlowSpecRaw {
    #[serde(default)]
    metadata: Metadata,
    input: IoNode,
    #[serde(default)]
    executors: Vec<TaskSpec>,
    output: IoNode,
    #[serde(flatten)]
    extra: FxHashMap<String, Value>,
}

/// Immutable workflow description with Arc-wrapped task specs
///
/// Task specs are shared with spawned execution futures, so they are
/// Arc-wrapped at parse time the same way the engine shares them later.
#[derive(Debug)]
pub struct FlowSpec {
    pub metadata: Metadata,
    pub input: IoNode,
    pub tasks: Vec<Arc<TaskSpec>>,
    pub output: IoNode,
    /// Unknown top-level keys, preserved verbatim
    pub extra: FxHashMap<String, Value>,
}

impl<'de> Deserialize<'de> for FlowSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = FlowSpecRaw::deserialize(deserializer)?;
        Ok(FlowSpec {
            metadata: raw.metadata,
            input: raw.input,
            tasks: raw.executors.into_iter().map(Arc::new).collect(),
            output: raw.output,
            extra: raw.extra,
        })
    }
}

impl FlowSpec {
    /// Parse a YAML workflow description
    pub fn from_yaml(text: &str) -> Result<Self, WeftError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Parse a JSON workflow description
    pub fn from_json(text: &str) -> Result<Self, WeftError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Tasks that are actually dispatched (`type: task`)
    pub fn runnable_tasks(&self) -> impl Iterator<Item = &Arc<TaskSpec>> {
        self.tasks.iter().filter(|t| t.kind == NodeKind::Task)
    }

    /// Short content fingerprint, used as a fallback workflow name
    ///
    /// Computed from metadata, node names and function names with xxh3.
    pub fn fingerprint(&self) -> String {
        use xxhash_rust::xxh3::xxh3_64;

        let mut input = String::new();
        input.push_str(&self.metadata.version);
        input.push_str(&self.metadata.description);
        input.push_str(&self.input.name);
        input.push_str(&self.output.name);
        for task in &self.tasks {
            input.push_str(&task.name);
            input.push_str(&task.func);
            for dep in &task.depends_on {
                input.push_str(dep);
            }
        }

        format!("{:016x}", xxh3_64(input.as_bytes()))
    }
}
