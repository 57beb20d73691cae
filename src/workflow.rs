//! Workflow façade - an immutable description plus run plumbing
//!
//! Holds a parsed `FlowSpec` and per-workflow run configuration. Every
//! run builds a fresh `Runner` (fresh results map, fresh cancellation
//! token), so a workflow instance may be executed many times and
//! concurrent runs never share mutable state.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::ast::{FlowSpec, NodeKind};
use crate::config::RunConfig;
use crate::dag::{validate_spec, TaskGraph};
use crate::error::WeftError;
use crate::registry::FunctionRegistry;
use crate::runtime::{RunOutcome, Runner};

/// Read-only structural view for tooling
#[derive(Debug, Clone, Serialize)]
pub struct FlowOutline {
    pub name: Option<String>,
    pub version: String,
    pub description: String,
    pub nodes: Vec<NodeOutline>,
    pub edges: Vec<EdgeOutline>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeOutline {
    pub name: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub func: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EdgeOutline {
    pub from: String,
    pub to: String,
}

pub struct Workflow {
    spec: Arc<FlowSpec>,
    config: RunConfig,
}

impl Workflow {
    pub fn new(spec: FlowSpec) -> Self {
        Self {
            spec: Arc::new(spec),
            config: RunConfig::default(),
        }
    }

    pub fn from_yaml(text: &str) -> Result<Self, WeftError> {
        Ok(Self::new(FlowSpec::from_yaml(text)?))
    }

    pub fn from_json(text: &str) -> Result<Self, WeftError> {
        Ok(Self::new(FlowSpec::from_json(text)?))
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Declared name from metadata, if any
    pub fn name(&self) -> Option<&str> {
        self.spec.metadata.name.as_deref()
    }

    pub fn spec(&self) -> &FlowSpec {
        &self.spec
    }

    /// Run the scheduler's validation without executing anything
    ///
    /// Pass a registry to also check that every task's function is
    /// registered; without one, only the structure is checked.
    pub fn validate(&self, registry: Option<&FunctionRegistry>) -> Result<(), WeftError> {
        let graph = TaskGraph::from_spec(&self.spec);
        validate_spec(&self.spec, &graph, registry)
    }

    /// Build a single-use runner for one execution
    pub fn runner(&self, registry: &FunctionRegistry) -> Runner {
        Runner::new(Arc::clone(&self.spec), registry.clone()).with_config(self.config.clone())
    }

    /// Execute once with the workflow's own input data
    pub async fn run(&self, registry: &FunctionRegistry) -> Result<RunOutcome, WeftError> {
        self.runner(registry).run(None).await
    }

    /// Execute once with overrides shallow-merged into the input data
    pub async fn run_with_overrides(
        &self,
        registry: &FunctionRegistry,
        overrides: Map<String, Value>,
    ) -> Result<RunOutcome, WeftError> {
        self.runner(registry).run(Some(overrides)).await
    }

    /// Structural view: nodes, edges, metadata
    pub fn describe(&self) -> FlowOutline {
        let mut nodes = vec![NodeOutline {
            name: self.spec.input.name.clone(),
            kind: "start",
            func: None,
        }];
        for task in &self.spec.tasks {
            nodes.push(NodeOutline {
                name: task.name.clone(),
                kind: match task.kind {
                    NodeKind::Task => "task",
                    NodeKind::Start => "start",
                    NodeKind::End => "end",
                },
                func: (!task.func.is_empty()).then(|| task.func.clone()),
            });
        }
        nodes.push(NodeOutline {
            name: self.spec.output.name.clone(),
            kind: "end",
            func: None,
        });

        let edges = self
            .spec
            .tasks
            .iter()
            .flat_map(|task| {
                task.depends_on.iter().map(|dep| EdgeOutline {
                    from: dep.clone(),
                    to: task.name.clone(),
                })
            })
            .collect();

        FlowOutline {
            name: self.spec.metadata.name.clone(),
            version: self.spec.metadata.version.clone(),
            description: self.spec.metadata.description.clone(),
            nodes,
            edges,
        }
    }
}
