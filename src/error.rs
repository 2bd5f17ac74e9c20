//! Domain-specific error types for the task-runner engine.
//!
//! This module provides a structured error hierarchy using [`thiserror`].
//! Internal modules return typed errors (e.g., [`ConfigError`], [`GraphError`])
//! while command handlers at the CLI boundary convert them to [`anyhow::Error`]
//! via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! PtError
//! ├── Config(ConfigError) — TOML/inline-metadata/env-file parsing, invariant violations
//! ├── Graph(GraphError)   — inheritance cycle, dependency cycle, missing node
//! └── Task(TaskError)     — execution, timeout, hook failures
//! ```

use thiserror::Error;

/// Top-level error type for the task-runner engine.
///
/// Aggregates domain-specific sub-errors and is convertible to
/// [`anyhow::Error`] for use at CLI command boundaries.
#[derive(Error, Debug)]
pub enum PtError {
    /// Configuration-related error (parsing, validation, inheritance).
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Dependency or inheritance graph error.
    #[error("{0}")]
    Graph(#[from] GraphError),

    /// Task execution error (failure, timeout, hook failure).
    #[error("{0}")]
    Task(#[from] TaskError),
}

/// Errors that arise from configuration loading, parsing, and resolution.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No `pt.toml` or `pyproject.toml` with a `[tool.pt]` table was found.
    #[error("no pt.toml or pyproject.toml with a [tool.pt] table found starting from {0}")]
    NotFound(String),

    /// The TOML file failed to parse.
    #[error("failed to parse {path}: {message}")]
    InvalidToml {
        /// Path to the file that failed to parse.
        path: String,
        /// Underlying parser message.
        message: String,
    },

    /// A config table contained a key not in the declared schema.
    #[error("unknown field '{field}' in {context}")]
    UnknownField {
        /// The offending field name.
        field: String,
        /// Human-readable location (e.g. `tasks.build`).
        context: String,
    },

    /// A declared invariant (I1-I7) was violated after resolution.
    #[error("{0}")]
    InvariantViolation(String),

    /// The inline script-metadata comment block was malformed.
    #[error("malformed inline metadata at line {line}: {message}")]
    MalformedMetadata {
        /// 1-indexed line number within the metadata block.
        line: usize,
        /// Human-readable description of the problem.
        message: String,
    },

    /// An env file line could not be parsed.
    #[error("malformed env file {path} at line {line}: {message}")]
    MalformedEnvFile {
        /// Path to the offending env file.
        path: String,
        /// 1-indexed line number.
        line: usize,
        /// Human-readable description of the problem.
        message: String,
    },

    /// An I/O error occurred while reading a config, script, or env file.
    #[error("io error reading {path}: {source}")]
    Io {
        /// Path to the file that could not be read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors that arise from inheritance or dependency graph construction.
#[derive(Error, Debug)]
pub enum GraphError {
    /// The `extend` chain for a task does not terminate.
    #[error("extend cycle detected: {0}")]
    ExtendCycle(String),

    /// The `depends_on` graph contains a cycle.
    #[error("dependency cycle detected: {0}")]
    DependencyCycle(String),

    /// A task, alias, or dependency target does not exist.
    #[error("task '{0}' not found")]
    TaskNotFound(String),
}

/// Errors that arise during task execution.
#[derive(Error, Debug)]
pub enum TaskError {
    /// A task's subprocess exited non-zero and `ignore_errors` was false.
    #[error("task '{task}' failed (exit {code})")]
    Failed {
        /// Name of the task that failed.
        task: String,
        /// Process exit code.
        code: i32,
    },

    /// A task's subprocess exceeded its configured timeout.
    #[error("task '{task}' timed out after {seconds}s")]
    Timeout {
        /// Name of the task that timed out.
        task: String,
        /// Configured timeout in seconds.
        seconds: u64,
    },

    /// A task's `before_task` hook exited non-zero.
    #[error("before_task hook for '{0}' failed, task not spawned")]
    HookFailure(String),

    /// Execution was interrupted by an external cancellation signal.
    #[error("interrupted")]
    Interrupted,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn config_not_found_display() {
        let e = ConfigError::NotFound("/home/user/proj".to_string());
        assert!(e.to_string().contains("/home/user/proj"));
    }

    #[test]
    fn unknown_field_display() {
        let e = ConfigError::UnknownField {
            field: "bogus".to_string(),
            context: "tasks.build".to_string(),
        };
        assert_eq!(e.to_string(), "unknown field 'bogus' in tasks.build");
    }

    #[test]
    fn graph_cycle_display() {
        let e = GraphError::DependencyCycle("a -> b -> a".to_string());
        assert_eq!(e.to_string(), "dependency cycle detected: a -> b -> a");
    }

    #[test]
    fn task_failed_display() {
        let e = TaskError::Failed {
            task: "build".to_string(),
            code: 1,
        };
        assert_eq!(e.to_string(), "task 'build' failed (exit 1)");
    }

    #[test]
    fn task_timeout_display() {
        let e = TaskError::Timeout {
            task: "slow".to_string(),
            seconds: 1,
        };
        assert_eq!(e.to_string(), "task 'slow' timed out after 1s");
    }

    #[test]
    fn pt_error_from_config_error() {
        let e: PtError = ConfigError::NotFound("x".to_string()).into();
        assert!(e.to_string().contains("no pt.toml"));
    }

    #[test]
    fn pt_error_from_graph_error() {
        let e: PtError = GraphError::TaskNotFound("foo".to_string()).into();
        assert!(e.to_string().contains("foo"));
    }

    #[test]
    fn pt_error_from_task_error() {
        let e: PtError = TaskError::Interrupted.into();
        assert_eq!(e.to_string(), "interrupted");
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn all_error_types_are_send_sync() {
        assert_send_sync::<PtError>();
        assert_send_sync::<ConfigError>();
        assert_send_sync::<GraphError>();
        assert_send_sync::<TaskError>();
    }

    #[test]
    fn config_error_converts_to_anyhow() {
        let e = ConfigError::NotFound("x".to_string());
        let _anyhow_err: anyhow::Error = e.into();
    }
}
