//! DataStore - the results map accumulated during one run
//!
//! One entry per task name, lock-free concurrent access via DashMap.
//! Arc<str> keys are shared with the scheduler and the event log.
//!
//! The record fields `output`, `status`, `error`, `start`, `end` and
//! `attempts` are addressable from placeholders (`${task.field}`).

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde_json::{json, Value};

/// Wall-clock milliseconds since the unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Task lifecycle states
///
/// `PENDING → READY → RUNNING → {SUCCESS, FAILED, TIMEOUT, CANCELLED}`.
/// Terminal states are sticky; the scheduler never moves a task out of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Ready,
    Running,
    Success,
    Failed,
    Timeout,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::Timeout | Self::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution record for one task
///
/// Output uses Arc for O(1) cloning of large values. A non-success
/// record keeps `output` as Null - downstream code must not read it.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub state: TaskState,
    pub output: Arc<Value>,
    pub error: Option<String>,
    pub attempts: u32,
    pub started_ms: Option<u64>,
    pub ended_ms: Option<u64>,
}

impl TaskRecord {
    pub fn pending() -> Self {
        Self {
            state: TaskState::Pending,
            output: Arc::new(Value::Null),
            error: None,
            attempts: 0,
            started_ms: None,
            ended_ms: None,
        }
    }

    /// An already-complete record (used to seed the input node)
    pub fn seeded(output: Value) -> Self {
        let now = now_ms();
        Self {
            state: TaskState::Success,
            output: Arc::new(output),
            error: None,
            attempts: 0,
            started_ms: Some(now),
            ended_ms: Some(now),
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == TaskState::Success
    }

    /// Read one addressable field of the record
    ///
    /// Placeholder paths address `output`, `status`, `error`, `start`,
    /// `end` and `attempts`; anything else is not a record field.
    pub fn field(&self, key: &str) -> Option<Value> {
        match key {
            "output" => Some((*self.output).clone()),
            "status" => Some(Value::String(self.state.as_str().to_string())),
            "error" => Some(match &self.error {
                Some(e) => Value::String(e.clone()),
                None => Value::Null,
            }),
            "start" => Some(self.started_ms.map_or(Value::Null, Value::from)),
            "end" => Some(self.ended_ms.map_or(Value::Null, Value::from)),
            "attempts" => Some(Value::from(self.attempts)),
            _ => None,
        }
    }

    /// Full record as a JSON object (event payloads, diagnostics)
    pub fn to_value(&self) -> Value {
        json!({
            "output": (*self.output).clone(),
            "status": self.state.as_str(),
            "error": self.error,
            "start": self.started_ms,
            "end": self.ended_ms,
            "attempts": self.attempts,
        })
    }
}

/// Thread-safe results map for a single run
///
/// Writes happen from the scheduler's completion handling and from the
/// executor updating its own task's record; names never collide, so no
/// coarse lock is needed.
#[derive(Clone, Default)]
pub struct DataStore {
    records: Arc<DashMap<Arc<str>, TaskRecord>>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry that is complete before the run starts (input node)
    pub fn seed(&self, name: Arc<str>, output: Value) {
        self.records.insert(name, TaskRecord::seeded(output));
    }

    pub fn insert(&self, name: Arc<str>, record: TaskRecord) {
        self.records.insert(name, record);
    }

    pub fn get(&self, name: &str) -> Option<TaskRecord> {
        self.records.get(name).map(|r| r.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    pub fn is_success(&self, name: &str) -> bool {
        self.records
            .get(name)
            .is_some_and(|r| r.value().is_success())
    }

    pub fn state(&self, name: &str) -> Option<TaskState> {
        self.records.get(name).map(|r| r.value().state)
    }

    pub fn set_state(&self, name: &str, state: TaskState) {
        if let Some(mut r) = self.records.get_mut(name) {
            if !r.state.is_terminal() {
                r.state = state;
            }
        }
    }

    /// READY → RUNNING: stamp start time, clear stale error
    pub fn mark_running(&self, name: &str) {
        if let Some(mut r) = self.records.get_mut(name) {
            r.state = TaskState::Running;
            r.started_ms = Some(now_ms());
            r.error = None;
        }
    }

    pub fn finish_success(&self, name: &str, output: Value, attempts: u32) {
        if let Some(mut r) = self.records.get_mut(name) {
            r.state = TaskState::Success;
            r.output = Arc::new(output);
            r.error = None;
            r.attempts = attempts;
            r.ended_ms = Some(now_ms());
        }
    }

    pub fn finish_failure(&self, name: &str, state: TaskState, error: String, attempts: u32) {
        debug_assert!(matches!(state, TaskState::Failed | TaskState::Timeout));
        if let Some(mut r) = self.records.get_mut(name) {
            r.state = state;
            r.output = Arc::new(Value::Null);
            r.error = Some(error);
            r.attempts = attempts;
            r.ended_ms = Some(now_ms());
        }
    }

    /// Any non-terminal state → CANCELLED
    pub fn mark_cancelled(&self, name: &str) {
        if let Some(mut r) = self.records.get_mut(name) {
            if !r.state.is_terminal() {
                r.state = TaskState::Cancelled;
                r.ended_ms = Some(now_ms());
            }
        }
    }

    /// Output value of a task, regardless of state (Null unless success)
    pub fn output(&self, name: &str) -> Option<Arc<Value>> {
        self.records.get(name).map(|r| Arc::clone(&r.output))
    }

    /// Resolve dot-path segments rooted at a task record
    ///
    /// Empty segments yield the task's `output` (the `${task}` and
    /// `${task.output}`-style conventions are applied by the resolver).
    /// The first segment is tried as a record field, then as a key of
    /// `output`. Remaining segments walk the value tree: object key
    /// lookup, array integer index; a scalar ends the walk with None.
    ///
    /// Only SUCCESS records are visible here: a task that has not
    /// completed - or failed - is indistinguishable from an absent one,
    /// so an undeclared read of a sibling resolves as a miss.
    pub fn resolve_segments(&self, name: &str, segments: &[&str]) -> Option<Value> {
        let record = self.records.get(name)?;
        if !record.is_success() {
            return None;
        }

        let (mut current, rest): (Value, &[&str]) = match segments.split_first() {
            None => return Some((*record.output).clone()),
            Some((first, rest)) => match record.field(first) {
                Some(v) => (v, rest),
                None => ((*record.output).clone(), segments),
            },
        };
        drop(record);

        for segment in rest {
            let next = match &current {
                Value::Object(map) => map.get(*segment).cloned(),
                Value::Array(items) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get(i).cloned()),
                _ => None,
            };
            current = next?;
        }

        Some(current)
    }

    /// Snapshot of all records (summaries, diagnostics)
    pub fn snapshot(&self) -> Vec<(Arc<str>, TaskRecord)> {
        self.records
            .iter()
            .map(|e| (Arc::clone(e.key()), e.value().clone()))
            .collect()
    }
}
