//! TaskExecutor - one task invocation under timeout, retry, cancellation
//!
//! The executor never propagates an error upward: every outcome lands in
//! the task's record (SUCCESS, FAILED, TIMEOUT or CANCELLED) and in the
//! event log. One task's deadline or failure never touches its siblings.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::ast::TaskSpec;
use crate::event::{EventKind, EventLog};
use crate::registry::{FunctionRegistry, ParamMap};
use crate::store::{DataStore, TaskState};

use super::retry::RetryConfig;

#[derive(Clone)]
pub struct TaskExecutor {
    registry: FunctionRegistry,
    store: DataStore,
    events: EventLog,
    retry: RetryConfig,
}

impl TaskExecutor {
    pub fn new(
        registry: FunctionRegistry,
        store: DataStore,
        events: EventLog,
        retry: RetryConfig,
    ) -> Self {
        Self {
            registry,
            store,
            events,
            retry,
        }
    }

    /// Run one task to a terminal state
    ///
    /// `params` is the already-resolved parameter bag; resolution happens
    /// at dispatch time so every attempt sees identical inputs.
    #[instrument(name = "task_execute", skip(self, task, params, cancel), fields(task = %task.name, func = %task.func))]
    pub async fn execute(&self, task: Arc<TaskSpec>, params: ParamMap, cancel: CancellationToken) {
        let name: Arc<str> = Arc::from(task.name.as_str());
        let started = Instant::now();

        let func = match self.registry.lookup(&task.func) {
            Ok(func) => func,
            Err(err) => {
                // Validation catches this before dispatch; a record is
                // still written in case execute is driven directly.
                self.store
                    .finish_failure(&name, TaskState::Failed, err.to_string(), 0);
                self.events.emit(EventKind::TaskFailed {
                    task: name,
                    error: err.to_string(),
                    duration_ms: 0,
                    attempts: 0,
                });
                return;
            }
        };

        self.store.mark_running(&name);
        self.events.emit(EventKind::TaskStarted {
            task: Arc::clone(&name),
            inputs: serde_json::to_value(&params).unwrap_or(serde_json::Value::Null),
        });

        let deadline = task.timeout_duration();
        let mut attempt: u32 = 0;
        let mut last_error = String::new();
        let mut timed_out = false;

        loop {
            attempt += 1;

            tokio::select! {
                _ = cancel.cancelled() => {
                    self.finish_cancelled(&name);
                    return;
                }
                outcome = tokio::time::timeout(deadline, (*func)(params.clone())) => {
                    match outcome {
                        Ok(Ok(value)) => {
                            let duration_ms = started.elapsed().as_millis() as u64;
                            self.events.emit(EventKind::TaskCompleted {
                                task: Arc::clone(&name),
                                output: Arc::new(value.clone()),
                                duration_ms,
                                attempts: attempt,
                            });
                            self.store.finish_success(&name, value, attempt);
                            debug!(attempt, duration_ms, "task succeeded");
                            return;
                        }
                        Ok(Err(err)) => {
                            timed_out = false;
                            last_error = err.to_string();
                            warn!(attempt, error = %last_error, "task attempt failed");
                        }
                        Err(_elapsed) => {
                            timed_out = true;
                            last_error =
                                format!("attempt exceeded {:.1}s deadline", deadline.as_secs_f64());
                            warn!(attempt, "task attempt timed out");
                        }
                    }
                }
            }

            if attempt > task.retry {
                break;
            }

            let delay = self.retry.delay_for(attempt - 1);
            self.events.emit(EventKind::TaskRetried {
                task: Arc::clone(&name),
                attempt,
                delay_ms: delay.as_millis() as u64,
            });

            tokio::select! {
                _ = cancel.cancelled() => {
                    self.finish_cancelled(&name);
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        if timed_out {
            self.events.emit(EventKind::TaskTimedOut {
                task: Arc::clone(&name),
                timeout_ms: deadline.as_millis() as u64,
                attempts: attempt,
            });
            self.store
                .finish_failure(&name, TaskState::Timeout, last_error, attempt);
        } else {
            self.events.emit(EventKind::TaskFailed {
                task: Arc::clone(&name),
                error: last_error.clone(),
                duration_ms,
                attempts: attempt,
            });
            self.store
                .finish_failure(&name, TaskState::Failed, last_error, attempt);
        }
    }

    fn finish_cancelled(&self, name: &Arc<str>) {
        self.store.mark_cancelled(name);
        self.events.emit(EventKind::TaskCancelled {
            task: Arc::clone(name),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;
    use crate::error::WeftError;
    use crate::store::TaskRecord;
    use serde_json::{json, Map, Value};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn task(name: &str, func: &str, timeout: f64, retry: u32) -> Arc<TaskSpec> {
        Arc::new(TaskSpec {
            name: name.to_string(),
            kind: NodeKind::Task,
            func: func.to_string(),
            custom_vars: Map::new(),
            depends_on: vec![],
            timeout,
            retry,
        })
    }

    fn harness(registry: FunctionRegistry) -> (TaskExecutor, DataStore, EventLog) {
        let store = DataStore::new();
        let events = EventLog::new();
        let retry = RetryConfig::default()
            .with_initial_delay(Duration::from_millis(1))
            .with_jitter(0.0);
        (
            TaskExecutor::new(registry, store.clone(), events.clone(), retry),
            store,
            events,
        )
    }

    #[tokio::test]
    async fn success_records_output_and_attempts() {
        let registry = FunctionRegistry::new();
        registry.register("answer", |_| async { Ok(json!(42)) });
        let (executor, store, events) = harness(registry);
        store.insert(Arc::from("t"), TaskRecord::pending());

        executor
            .execute(task("t", "answer", 5.0, 0), ParamMap::default(), CancellationToken::new())
            .await;

        let record = store.get("t").unwrap();
        assert_eq!(record.state, TaskState::Success);
        assert_eq!(*record.output, json!(42));
        assert_eq!(record.attempts, 1);
        assert!(record.started_ms.is_some() && record.ended_ms.is_some());

        let kinds: Vec<_> = events.filter_task("t");
        assert!(kinds
            .iter()
            .any(|e| matches!(e.kind, EventKind::TaskCompleted { .. })));
    }

    #[tokio::test]
    async fn persistent_failure_exhausts_retry_budget() {
        let registry = FunctionRegistry::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        registry.register("broken", move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<Value, _>(WeftError::Execution("boom".to_string()))
            }
        });
        let (executor, store, events) = harness(registry);
        store.insert(Arc::from("t"), TaskRecord::pending());

        executor
            .execute(task("t", "broken", 5.0, 2), ParamMap::default(), CancellationToken::new())
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3); // first + 2 retries
        let record = store.get("t").unwrap();
        assert_eq!(record.state, TaskState::Failed);
        assert_eq!(record.attempts, 3);
        assert!(record.error.as_deref().unwrap().contains("boom"));
        assert_eq!(*record.output, Value::Null);

        let retried = events
            .filter_task("t")
            .iter()
            .filter(|e| matches!(e.kind, EventKind::TaskRetried { .. }))
            .count();
        assert_eq!(retried, 2);
    }

    #[tokio::test]
    async fn flaky_function_succeeds_on_third_attempt() {
        let registry = FunctionRegistry::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        registry.register("flaky", move |_| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(WeftError::Execution("transient".to_string()))
                } else {
                    Ok(json!("recovered"))
                }
            }
        });
        let (executor, store, _events) = harness(registry);
        store.insert(Arc::from("t"), TaskRecord::pending());

        executor
            .execute(task("t", "flaky", 5.0, 2), ParamMap::default(), CancellationToken::new())
            .await;

        let record = store.get("t").unwrap();
        assert_eq!(record.state, TaskState::Success);
        assert_eq!(record.attempts, 3);
        assert_eq!(*record.output, json!("recovered"));
    }

    #[tokio::test]
    async fn deadline_expiry_yields_timeout_state() {
        let registry = FunctionRegistry::new();
        registry.register("slow", |_| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(json!("late"))
        });
        let (executor, store, _events) = harness(registry);
        store.insert(Arc::from("t"), TaskRecord::pending());

        let started = Instant::now();
        executor
            .execute(task("t", "slow", 0.1, 0), ParamMap::default(), CancellationToken::new())
            .await;

        assert!(started.elapsed() < Duration::from_secs(1));
        let record = store.get("t").unwrap();
        assert_eq!(record.state, TaskState::Timeout);
        assert!(record.error.as_deref().unwrap().contains("deadline"));
    }

    #[tokio::test]
    async fn timeout_then_success_within_retry_budget() {
        let registry = FunctionRegistry::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        registry.register("warmup", move |_| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Ok(json!("warm"))
            }
        });
        let (executor, store, _events) = harness(registry);
        store.insert(Arc::from("t"), TaskRecord::pending());

        executor
            .execute(task("t", "warmup", 0.1, 1), ParamMap::default(), CancellationToken::new())
            .await;

        let record = store.get("t").unwrap();
        assert_eq!(record.state, TaskState::Success);
        assert_eq!(record.attempts, 2);
    }

    #[tokio::test]
    async fn cancellation_abandons_the_attempt() {
        let registry = FunctionRegistry::new();
        registry.register("forever", |_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(json!("never"))
        });
        let (executor, store, events) = harness(registry);
        store.insert(Arc::from("t"), TaskRecord::pending());

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        executor
            .execute(task("t", "forever", 30.0, 0), ParamMap::default(), cancel)
            .await;

        let record = store.get("t").unwrap();
        assert_eq!(record.state, TaskState::Cancelled);
        assert!(events
            .filter_task("t")
            .iter()
            .any(|e| matches!(e.kind, EventKind::TaskCancelled { .. })));
    }

    #[tokio::test]
    async fn unknown_function_fails_the_record() {
        let (executor, store, _events) = harness(FunctionRegistry::new());
        store.insert(Arc::from("t"), TaskRecord::pending());

        executor
            .execute(task("t", "ghost", 5.0, 0), ParamMap::default(), CancellationToken::new())
            .await;

        let record = store.get("t").unwrap();
        assert_eq!(record.state, TaskState::Failed);
        assert!(record.error.as_deref().unwrap().contains("WEFT-020"));
    }
}
