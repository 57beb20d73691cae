//! Weft - DAG workflow engine for concurrent LLM and API tasks
//!
//! A workflow is a directed acyclic graph of tasks described in a
//! declarative document. Each task invokes a registered async function,
//! consumes values produced upstream through `${task.field}`
//! placeholders, and yields a value downstream tasks may consume. The
//! engine validates the graph, dispatches independent tasks in
//! parallel, enforces per-task timeouts and retries, and returns the
//! resolved output plus a per-task summary.
//!
//! ## Module Responsibilities
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`ast`] | Description parsing → `FlowSpec`, `TaskSpec`, `IoNode` |
//! | [`registry`] | name → async callable table consulted at dispatch |
//! | [`binding`] | `${task.field}` placeholder resolution (pure) |
//! | [`store`] | Per-run results map (`DataStore`, `TaskRecord`) |
//! | [`dag`] | Dependency graph, cycle detection, validation |
//! | [`runtime`] | Frontier scheduling, timeout/retry execution |
//! | [`workflow`] | Workflow façade: run / validate / describe |
//! | [`engine`] | Process-wide workflow + function tables |
//! | [`event`] | Append-only execution audit trail |
//! | [`functions`] | Built-in library incl. LLM chat client |
//! | [`error`] | Error types with codes and fix suggestions |

pub mod ast;
pub mod binding;
pub mod config;
pub mod dag;
pub mod engine;
pub mod error;
pub mod event;
pub mod functions;
pub mod registry;
pub mod runtime;
pub mod store;
pub mod workflow;

// Description types
pub use ast::{FlowSpec, IoNode, Metadata, NodeKind, TaskSpec};

// Configuration
pub use config::{mask_api_key, RunConfig};

// Façades
pub use engine::Engine;
pub use workflow::{FlowOutline, Workflow};

// Errors
pub use error::{FixSuggestion, WeftError};

// Events
pub use event::{Event, EventKind, EventLog};

// Registry
pub use registry::{FunctionRegistry, ParamMap, TaskFuture};

// Runtime
pub use runtime::{RetryConfig, RunOutcome, Runner, TaskExecutor, TaskSummary};

// Results map
pub use store::{DataStore, TaskRecord, TaskState};

// Built-in LLM plumbing
pub use functions::{ChatMessage, ChatRequest, LlmClient, ModelCatalog, ModelConfig, Platform};
