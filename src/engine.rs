//! Engine façade - process-wide workflow and function tables
//!
//! The engine owns two tables for the life of the process: named
//! workflow instances and the shared function registry (pre-loaded with
//! the built-in library). Prefer passing one engine handle around over
//! ambient globals; cloning shares both tables.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Map, Value};
use tracing::info;

use crate::ast::FlowSpec;
use crate::error::WeftError;
use crate::functions;
use crate::registry::{FunctionRegistry, ParamMap};
use crate::runtime::RunOutcome;
use crate::workflow::Workflow;

#[derive(Clone)]
pub struct Engine {
    workflows: Arc<DashMap<String, Arc<Workflow>>>,
    registry: FunctionRegistry,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Engine with the built-in function library installed
    pub fn new() -> Self {
        let registry = FunctionRegistry::new();
        functions::install_builtins(&registry);
        Self {
            workflows: Arc::new(DashMap::new()),
            registry,
        }
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Register (or replace) a function in the shared registry
    pub fn register_function<F, Fut>(&self, name: impl Into<String>, func: F)
    where
        F: Fn(ParamMap) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, WeftError>> + Send + 'static,
    {
        self.registry.register(name, func);
    }

    /// Store a workflow under `metadata.name`, or a fingerprint-derived
    /// name when the description carries none. Returns the name.
    ///
    /// The description is structurally validated up front; function
    /// references are checked at run time against the live registry.
    pub fn load(&self, spec: FlowSpec) -> Result<String, WeftError> {
        let name = spec
            .metadata
            .name
            .clone()
            .unwrap_or_else(|| format!("flow-{}", spec.fingerprint()));
        self.load_named(name, spec)
    }

    /// Store a workflow under a caller-chosen name
    pub fn load_named(&self, name: impl Into<String>, spec: FlowSpec) -> Result<String, WeftError> {
        let name = name.into();
        let workflow = Workflow::new(spec);
        workflow.validate(None)?;
        info!(workflow = %name, "workflow loaded");
        self.workflows.insert(name.clone(), Arc::new(workflow));
        Ok(name)
    }

    pub fn load_yaml(&self, text: &str) -> Result<String, WeftError> {
        self.load(FlowSpec::from_yaml(text)?)
    }

    pub fn load_json(&self, text: &str) -> Result<String, WeftError> {
        self.load(FlowSpec::from_json(text)?)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Workflow>> {
        self.workflows.get(name).map(|w| Arc::clone(w.value()))
    }

    /// Run a loaded workflow by name
    ///
    /// Overrides are shallow-merged into the workflow's input data.
    pub async fn run(
        &self,
        name: &str,
        overrides: Option<Map<String, Value>>,
    ) -> Result<RunOutcome, WeftError> {
        let workflow = self.get(name).ok_or_else(|| WeftError::WorkflowNotFound {
            name: name.to_string(),
        })?;
        workflow.runner(&self.registry).run(overrides).await
    }

    pub fn list_workflows(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workflows.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn list_functions(&self) -> Vec<String> {
        self.registry.list()
    }
}
