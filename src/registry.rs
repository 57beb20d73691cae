//! FunctionRegistry - name → async callable mapping
//!
//! Process-lifetime table consulted at dispatch time. Registration is
//! idempotent (last registration wins); lookups are lock-free and safe
//! from any number of concurrent runs.
//!
//! A registered function takes one flat parameter map and returns any
//! JSON-representable value. The registry carries no parameter schema;
//! type agreement is between the workflow author and the function.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::WeftError;

/// Resolved parameter bag handed to a function
pub type ParamMap = FxHashMap<String, Value>;

/// Boxed future returned by registered functions
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<Value, WeftError>> + Send>>;

/// Type-erased registered function
pub type TaskFn = dyn Fn(ParamMap) -> TaskFuture + Send + Sync;

#[derive(Clone, Default)]
pub struct FunctionRegistry {
    funcs: Arc<DashMap<String, Arc<TaskFn>>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function under a name, replacing any previous one
    pub fn register<F, Fut>(&self, name: impl Into<String>, func: F)
    where
        F: Fn(ParamMap) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, WeftError>> + Send + 'static,
    {
        let boxed: Arc<TaskFn> = Arc::new(move |params| Box::pin(func(params)));
        self.funcs.insert(name.into(), boxed);
    }

    /// Look up a function by name
    pub fn lookup(&self, name: &str) -> Result<Arc<TaskFn>, WeftError> {
        self.funcs
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| WeftError::FunctionNotFound {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.funcs.contains_key(name)
    }

    /// Registered names in lexicographic order
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.funcs.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}
