//! EventLog - append-only log of everything a run did
//!
//! - Event: envelope with monotonic id + run-relative timestamp + kind
//! - EventKind: workflow-level and task-level variants
//! - EventLog: thread-safe, clone-shares-the-log
//!
//! Task ids use Arc<str> shared with the scheduler and results map.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Single event in the workflow execution log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence id (for ordering)
    pub id: u64,
    /// Time since the log was created (ms)
    pub timestamp_ms: u64,
    /// Event type and data
    pub kind: EventKind,
}

/// All event types emitted during a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // WORKFLOW LEVEL
    // ═══════════════════════════════════════════
    WorkflowStarted {
        task_count: usize,
        /// Unique id for this execution
        run_id: String,
        /// Content fingerprint of the workflow description
        fingerprint: String,
        engine_version: String,
    },
    WorkflowCompleted {
        output: Arc<Value>,
        total_duration_ms: u64,
    },
    WorkflowCancelled {
        reason: String,
    },

    // ═══════════════════════════════════════════
    // TASK LEVEL
    // ═══════════════════════════════════════════
    TaskScheduled {
        task: Arc<str>,
        dependencies: Vec<Arc<str>>,
    },
    /// Execution begins with the resolved parameter bag
    TaskStarted {
        task: Arc<str>,
        inputs: Value,
    },
    TaskCompleted {
        task: Arc<str>,
        output: Arc<Value>,
        duration_ms: u64,
        attempts: u32,
    },
    TaskFailed {
        task: Arc<str>,
        error: String,
        duration_ms: u64,
        attempts: u32,
    },
    TaskTimedOut {
        task: Arc<str>,
        timeout_ms: u64,
        attempts: u32,
    },
    /// An attempt failed and another will follow after the backoff delay
    TaskRetried {
        task: Arc<str>,
        attempt: u32,
        delay_ms: u64,
    },
    TaskCancelled {
        task: Arc<str>,
    },
}

impl EventKind {
    /// Extract the task id if the event is task-related
    pub fn task(&self) -> Option<&str> {
        match self {
            Self::TaskScheduled { task, .. }
            | Self::TaskStarted { task, .. }
            | Self::TaskCompleted { task, .. }
            | Self::TaskFailed { task, .. }
            | Self::TaskTimedOut { task, .. }
            | Self::TaskRetried { task, .. }
            | Self::TaskCancelled { task } => Some(task),
            _ => None,
        }
    }
}

/// Thread-safe, append-only event log
///
/// Cloning shares the underlying log; the runner, executor and any
/// observer all append to and read the same sequence.
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    next_id: Arc<AtomicU64>,
    started: Instant,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(0)),
            started: Instant::now(),
        }
    }

    /// Append an event and return its id
    pub fn emit(&self, kind: EventKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            id,
            timestamp_ms: self.started.elapsed().as_millis() as u64,
            kind,
        };
        self.events.write().push(event);
        id
    }

    /// Snapshot of all events so far
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Events belonging to one task
    pub fn filter_task(&self, task: &str) -> Vec<Event> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind.task() == Some(task))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Serialize the whole log as a JSON array
    pub fn to_json(&self) -> Value {
        serde_json::to_value(&*self.events.read()).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_are_monotonic() {
        let log = EventLog::new();
        for _ in 0..5 {
            log.emit(EventKind::TaskCancelled {
                task: Arc::from("t"),
            });
        }

        let ids: Vec<u64> = log.events().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn filter_by_task() {
        let log = EventLog::new();
        log.emit(EventKind::TaskStarted {
            task: Arc::from("a"),
            inputs: json!({}),
        });
        log.emit(EventKind::TaskStarted {
            task: Arc::from("b"),
            inputs: json!({}),
        });
        log.emit(EventKind::TaskCompleted {
            task: Arc::from("a"),
            output: Arc::new(json!("done")),
            duration_ms: 3,
            attempts: 1,
        });

        let a_events = log.filter_task("a");
        assert_eq!(a_events.len(), 2);
        assert!(log.filter_task("ghost").is_empty());
    }

    #[test]
    fn clones_share_the_log() {
        let log = EventLog::new();
        let observer = log.clone();
        log.emit(EventKind::WorkflowCancelled {
            reason: "test".to_string(),
        });
        assert_eq!(observer.len(), 1);
    }

    #[test]
    fn to_json_tags_event_types() {
        let log = EventLog::new();
        log.emit(EventKind::WorkflowStarted {
            task_count: 2,
            run_id: "run-1".to_string(),
            fingerprint: "abc".to_string(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
        });

        let json = log.to_json();
        let array = json.as_array().unwrap();
        assert_eq!(array[0]["kind"]["type"], "workflow_started");
        assert_eq!(array[0]["id"], 0);
    }

    #[test]
    fn timestamps_do_not_decrease() {
        let log = EventLog::new();
        for _ in 0..3 {
            log.emit(EventKind::TaskCancelled {
                task: Arc::from("t"),
            });
        }
        let events = log.events();
        for window in events.windows(2) {
            assert!(window[1].timestamp_ms >= window[0].timestamp_ms);
        }
    }
}
