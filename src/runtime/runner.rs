//! Runner - DAG scheduling loop for one workflow run
//!
//! Repeatedly computes the ready frontier (pending tasks whose
//! dependencies all succeeded), dispatches the whole frontier
//! concurrently, waits for the wave to drain, and folds results into
//! the run's results map. When the frontier is empty but tasks remain,
//! progress is blocked by an upstream failure and the remainder is
//! cancelled.
//!
//! Results-map entries are keyed by task name and placeholders read by
//! name, so the final output is deterministic whenever the registered
//! functions are.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::ast::{FlowSpec, TaskSpec};
use crate::binding;
use crate::config::RunConfig;
use crate::dag::{validate_spec, TaskGraph};
use crate::error::WeftError;
use crate::event::{EventKind, EventLog};
use crate::registry::FunctionRegistry;
use crate::store::{DataStore, TaskRecord, TaskState};

use super::executor::TaskExecutor;

/// Per-task slice of the result envelope
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub state: TaskState,
    pub attempts: u32,
    pub start: Option<u64>,
    pub end: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a completed run hands back
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// The output node's data tree with placeholders resolved
    pub output: Value,
    /// Final state of every dispatched task
    pub tasks: BTreeMap<String, TaskSummary>,
}

impl RunOutcome {
    /// True when every task reached SUCCESS
    pub fn all_succeeded(&self) -> bool {
        self.tasks.values().all(|t| t.state == TaskState::Success)
    }
}

/// Owns the execution of one workflow run
///
/// A Runner is single-use: the workflow façade builds a fresh one (with
/// a fresh results map) for every run, so concurrent runs of the same
/// workflow never share mutable state.
pub struct Runner {
    spec: Arc<FlowSpec>,
    registry: FunctionRegistry,
    store: DataStore,
    events: EventLog,
    config: RunConfig,
    cancel: CancellationToken,
}

impl Runner {
    pub fn new(spec: Arc<FlowSpec>, registry: FunctionRegistry) -> Self {
        Self {
            spec,
            registry,
            store: DataStore::new(),
            events: EventLog::new(),
            config: RunConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach a shared event log (observers, tests)
    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = events;
        self
    }

    /// Attach an external cancellation source
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn datastore(&self) -> &DataStore {
        &self.store
    }

    /// Execute the workflow to completion
    ///
    /// Fails fast on validation errors; task-level failures never abort
    /// the run and are reported through the outcome's task summaries.
    #[instrument(name = "workflow_run", skip(self, input_overrides), fields(tasks = self.spec.tasks.len()))]
    pub async fn run(
        &self,
        input_overrides: Option<Map<String, Value>>,
    ) -> Result<RunOutcome, WeftError> {
        let run_started = Instant::now();

        let graph = TaskGraph::from_spec(&self.spec);
        validate_spec(&self.spec, &graph, Some(&self.registry))?;

        // Bind input data (shallow-merged with overrides) into the map
        let mut input_data = self.spec.input.data.clone();
        if let Some(overrides) = input_overrides {
            for (key, value) in overrides {
                input_data.insert(key, value);
            }
        }
        let input_name: Arc<str> = Arc::from(self.spec.input.name.as_str());
        self.store
            .seed(Arc::clone(&input_name), Value::Object(input_data));

        let mut pending: Vec<Arc<TaskSpec>> = self.spec.runnable_tasks().cloned().collect();
        for task in &pending {
            self.store
                .insert(Arc::from(task.name.as_str()), TaskRecord::pending());
        }

        self.events.emit(EventKind::WorkflowStarted {
            task_count: pending.len(),
            run_id: format!("run-{}", Uuid::new_v4()),
            fingerprint: self.spec.fingerprint(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
        });
        info!(task_count = pending.len(), "workflow run started");

        // Whole-run deadline feeds the same cancellation token
        let watchdog = self.config.run_timeout.map(|timeout| {
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => cancel.cancel(),
                    _ = cancel.cancelled() => {}
                }
            })
        });

        let executor = TaskExecutor::new(
            self.registry.clone(),
            self.store.clone(),
            self.events.clone(),
            self.config.retry.clone(),
        );
        let semaphore = self
            .config
            .max_in_flight
            .map(|n| Arc::new(Semaphore::new(n)));

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            // Ready frontier: every pending task whose dependencies all
            // reached SUCCESS (the input node counts as succeeded)
            let mut ready: Vec<Arc<TaskSpec>> = Vec::new();
            let mut rest: Vec<Arc<TaskSpec>> = Vec::new();
            for task in pending.drain(..) {
                let deps_done = graph
                    .dependencies_of(&task.name)
                    .iter()
                    .all(|dep| self.store.is_success(dep));
                if deps_done {
                    ready.push(task);
                } else {
                    rest.push(task);
                }
            }
            pending = rest;

            if ready.is_empty() {
                // Either done, or an upstream failure blocks progress
                break;
            }

            debug!(frontier = ready.len(), "dispatching ready frontier");

            let mut wave: JoinSet<()> = JoinSet::new();
            for task in ready {
                let name: Arc<str> = Arc::from(task.name.as_str());
                self.store.set_state(&name, TaskState::Ready);
                self.events.emit(EventKind::TaskScheduled {
                    task: name,
                    dependencies: graph.dependencies_of(&task.name).to_vec(),
                });

                // A task observes its transitive dependencies plus the
                // input node - never a sibling, however the wave races
                let mut visible = graph.transitive_dependencies(&task.name);
                visible.insert(input_name.clone());

                let executor = executor.clone();
                let store = self.store.clone();
                let semaphore = semaphore.clone();
                let cancel = self.cancel.child_token();

                wave.spawn(async move {
                    let _permit = match &semaphore {
                        Some(s) => Some(s.acquire().await.expect("semaphore closed")),
                        None => None,
                    };
                    if cancel.is_cancelled() {
                        store.mark_cancelled(&task.name);
                        return;
                    }
                    // An unresolvable placeholder keeps its literal text
                    let params = binding::resolve_params(&task.custom_vars, &store, &visible);
                    executor.execute(task, params, cancel).await;
                });
            }

            while let Some(joined) = wave.join_next().await {
                if let Err(err) = joined {
                    return Err(WeftError::Execution(format!("task panicked: {err}")));
                }
            }
        }

        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }

        // Drain whatever could not run: cancelled, not failed
        for task in &pending {
            self.store.mark_cancelled(&task.name);
            self.events.emit(EventKind::TaskCancelled {
                task: Arc::from(task.name.as_str()),
            });
        }
        if self.cancel.is_cancelled() {
            self.events.emit(EventKind::WorkflowCancelled {
                reason: "run cancelled".to_string(),
            });
        }

        let output = binding::resolve_value(&Value::Object(self.spec.output.data.clone()), &self.store);

        let mut tasks = BTreeMap::new();
        for task in self.spec.runnable_tasks() {
            if let Some(record) = self.store.get(&task.name) {
                tasks.insert(
                    task.name.clone(),
                    TaskSummary {
                        state: record.state,
                        attempts: record.attempts,
                        start: record.started_ms,
                        end: record.ended_ms,
                        error: record.error,
                    },
                );
            }
        }

        self.events.emit(EventKind::WorkflowCompleted {
            output: Arc::new(output.clone()),
            total_duration_ms: run_started.elapsed().as_millis() as u64,
        });
        info!(
            duration_ms = run_started.elapsed().as_millis() as u64,
            "workflow run finished"
        );

        Ok(RunOutcome { output, tasks })
    }
}
