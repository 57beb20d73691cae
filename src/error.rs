//! Weft error types with stable error codes
//!
//! Error code ranges:
//! - WEFT-000-009: workflow description / loader errors
//! - WEFT-010-019: graph validation errors
//! - WEFT-020-029: registry errors
//! - WEFT-030-039: task execution errors
//! - WEFT-040-049: function / parameter errors
//! - WEFT-050-059: provider (LLM / HTTP) errors
//! - WEFT-090-099: IO / serialization errors

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WeftError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
///
/// Implements both `thiserror::Error` for std error compatibility
/// and `miette::Diagnostic` for terminal error display.
#[derive(Error, Debug, Diagnostic)]
pub enum WeftError {
    // ═══════════════════════════════════════════
    // DESCRIPTION / LOADER ERRORS (000-009)
    // ═══════════════════════════════════════════
    #[error("[WEFT-001] Failed to parse workflow description: {details}")]
    #[diagnostic(
        code(weft::parse_error),
        help("Check document syntax: metadata/input/executors/output keys")
    )]
    ParseError { details: String },

    #[error("[WEFT-002] Workflow '{name}' not found in engine")]
    #[diagnostic(
        code(weft::workflow_not_found),
        help("Load the workflow first, or check the name")
    )]
    WorkflowNotFound { name: String },

    #[error("[WEFT-003] Workflow validation failed: {reason}")]
    #[diagnostic(code(weft::validation_error))]
    ValidationError { reason: String },

    // ═══════════════════════════════════════════
    // GRAPH VALIDATION ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("[WEFT-010] Duplicate task name '{name}' in workflow")]
    DuplicateTask { name: String },

    #[error("[WEFT-011] Missing dependency: task '{task}' depends on unknown '{dep}'")]
    MissingDependency { task: String, dep: String },

    #[error("[WEFT-012] Cycle detected in task graph: {cycle}")]
    #[diagnostic(
        code(weft::cycle_detected),
        help("Remove circular depends_on references from your workflow")
    )]
    CycleDetected { cycle: String },

    #[error("[WEFT-013] Task '{task}' references unknown function '{func}'")]
    UnknownFunction { task: String, func: String },

    // ═══════════════════════════════════════════
    // REGISTRY ERRORS (020-029)
    // ═══════════════════════════════════════════
    #[error("[WEFT-020] Function '{name}' not registered")]
    #[diagnostic(
        code(weft::function_not_found),
        help("Register the function with Engine::register_function before running")
    )]
    FunctionNotFound { name: String },

    // ═══════════════════════════════════════════
    // TASK EXECUTION ERRORS (030-039)
    // ═══════════════════════════════════════════
    #[error("[WEFT-030] Task '{task}' failed: {reason}")]
    TaskFailed { task: String, reason: String },

    #[error("[WEFT-031] Task '{task}' timed out after {timeout_ms}ms")]
    TaskTimeout { task: String, timeout_ms: u64 },

    /// Generic execution error (function bodies)
    #[error("Execution error: {0}")]
    Execution(String),

    // ═══════════════════════════════════════════
    // FUNCTION / PARAMETER ERRORS (040-049)
    // ═══════════════════════════════════════════
    #[error("[WEFT-040] Function '{func}' missing required parameter '{param}'")]
    MissingParameter { func: String, param: String },

    #[error("[WEFT-041] Function '{func}' parameter '{param}': {reason}")]
    BadParameter {
        func: String,
        param: String,
        reason: String,
    },

    #[error("[WEFT-042] Invalid expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    // ═══════════════════════════════════════════
    // PROVIDER ERRORS (050-059)
    // ═══════════════════════════════════════════
    #[error("[WEFT-050] Provider API error: {message}")]
    ProviderApiError { message: String },

    #[error("[WEFT-051] Unsupported platform '{platform}' for model '{model}'")]
    UnsupportedPlatform { platform: String, model: String },

    #[error("[WEFT-052] HTTP request failed: {message}")]
    HttpError { message: String },

    // ═══════════════════════════════════════════
    // IO / SERIALIZATION ERRORS (090-099)
    // ═══════════════════════════════════════════
    #[error("[WEFT-090] IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("[WEFT-091] JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("[WEFT-092] YAML parse error: {0}")]
    #[diagnostic(
        code(weft::yaml_parse),
        help("Check YAML syntax: indentation must be consistent")
    )]
    YamlParse(#[from] serde_yaml::Error),
}

impl WeftError {
    /// Get the stable error code (e.g., "WEFT-001")
    pub fn code(&self) -> &'static str {
        match self {
            Self::ParseError { .. } => "WEFT-001",
            Self::WorkflowNotFound { .. } => "WEFT-002",
            Self::ValidationError { .. } => "WEFT-003",
            Self::DuplicateTask { .. } => "WEFT-010",
            Self::MissingDependency { .. } => "WEFT-011",
            Self::CycleDetected { .. } => "WEFT-012",
            Self::UnknownFunction { .. } => "WEFT-013",
            Self::FunctionNotFound { .. } => "WEFT-020",
            Self::TaskFailed { .. } => "WEFT-030",
            Self::TaskTimeout { .. } => "WEFT-031",
            Self::Execution(_) => "WEFT-032",
            Self::MissingParameter { .. } => "WEFT-040",
            Self::BadParameter { .. } => "WEFT-041",
            Self::InvalidExpression { .. } => "WEFT-042",
            Self::ProviderApiError { .. } => "WEFT-050",
            Self::UnsupportedPlatform { .. } => "WEFT-051",
            Self::HttpError { .. } => "WEFT-052",
            Self::IoError(_) => "WEFT-090",
            Self::JsonError(_) => "WEFT-091",
            Self::YamlParse(_) => "WEFT-092",
        }
    }

    /// Check if the error is transient (a retry may succeed)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::TaskTimeout { .. } | Self::ProviderApiError { .. } | Self::HttpError { .. } => {
                true
            }
            Self::Execution(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("timeout")
                    || msg.contains("rate limit")
                    || msg.contains("connection")
                    || msg.contains("unavailable")
                    || msg.contains("503")
                    || msg.contains("429")
                    || msg.contains("502")
                    || msg.contains("504")
            }
            _ => false,
        }
    }
}

impl FixSuggestion for WeftError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            WeftError::ParseError { .. } => {
                Some("Check the description has metadata/input/executors/output")
            }
            WeftError::WorkflowNotFound { .. } => {
                Some("Load the workflow with Engine::load before running it")
            }
            WeftError::ValidationError { .. } => Some("Check task specs against the schema"),
            WeftError::DuplicateTask { .. } => {
                Some("Task names must be unique, including the input node name")
            }
            WeftError::MissingDependency { .. } => {
                Some("Add the missing task or fix the depends_on reference")
            }
            WeftError::CycleDetected { .. } => {
                Some("Remove circular depends_on references from your workflow")
            }
            WeftError::UnknownFunction { .. } | WeftError::FunctionNotFound { .. } => {
                Some("Register the function before running, or check the spelling")
            }
            WeftError::TaskFailed { .. } => Some("Check the task's function and parameters"),
            WeftError::TaskTimeout { .. } => Some("Increase the task timeout or retry budget"),
            WeftError::Execution(_) => Some("Check the function input values"),
            WeftError::MissingParameter { .. } | WeftError::BadParameter { .. } => {
                Some("Check custom_vars for this task")
            }
            WeftError::InvalidExpression { .. } => {
                Some("Expressions support + - * / % ^ and parentheses")
            }
            WeftError::ProviderApiError { .. } => {
                Some("Check the API key and provider availability")
            }
            WeftError::UnsupportedPlatform { .. } => {
                Some("Add the model to the catalog with a supported platform")
            }
            WeftError::HttpError { .. } => Some("Check the URL and network connectivity"),
            WeftError::IoError(_) => Some("Check file path and permissions"),
            WeftError::JsonError(_) => Some("Check JSON syntax"),
            WeftError::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_extraction() {
        let err = WeftError::CycleDetected {
            cycle: "a → b → a".to_string(),
        };
        assert_eq!(err.code(), "WEFT-012");
    }

    #[test]
    fn error_display_includes_code() {
        let err = WeftError::TaskTimeout {
            task: "summarize".to_string(),
            timeout_ms: 30_000,
        };
        let msg = err.to_string();
        assert!(msg.contains("[WEFT-031]"));
        assert!(msg.contains("summarize"));
    }

    #[test]
    fn recoverable_classification() {
        assert!(WeftError::TaskTimeout {
            task: "x".into(),
            timeout_ms: 1000
        }
        .is_recoverable());
        assert!(WeftError::Execution("503 service unavailable".into()).is_recoverable());
        assert!(!WeftError::ValidationError {
            reason: "bad".into()
        }
        .is_recoverable());
        assert!(!WeftError::Execution("division by zero".into()).is_recoverable());
    }

    #[test]
    fn fix_suggestions_present_for_validation_errors() {
        let err = WeftError::MissingDependency {
            task: "b".into(),
            dep: "ghost".into(),
        };
        assert!(err.fix_suggestion().is_some());
    }
}
