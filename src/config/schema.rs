//! Typed, strict-mode representation of the config file's TOML tables (C1).
//!
//! Every table rejects unknown keys so that a typo in a config file is
//! reported rather than silently ignored. These are the *raw* shapes as
//! written by a user; [`super::loader`] resolves them (inheritance,
//! profile overlay) into effective records used by the rest of the engine.
use std::collections::HashMap;

use serde::Deserialize;

use crate::error::ConfigError;

/// Allowed alphabet for task names, aliases, tags, and categories.
fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Validate a tag or category string against `[A-Za-z0-9_-]+`.
///
/// # Errors
///
/// Returns [`ConfigError::InvariantViolation`] if the string is empty or
/// contains a character outside the allowed alphabet.
pub fn validate_tag(tag: &str, context: &str) -> Result<(), ConfigError> {
    if tag.is_empty() {
        return Err(ConfigError::InvariantViolation(format!(
            "{context}: tag/category must be non-empty"
        )));
    }
    if !tag.chars().all(is_identifier_char) {
        return Err(ConfigError::InvariantViolation(format!(
            "{context}: tag/category '{tag}' must match [A-Za-z0-9_-]+"
        )));
    }
    Ok(())
}

/// Validate a task name or alias against `[A-Za-z0-9_-]+`, with an optional
/// leading `_` permitted (it marks the task private, see [`TaskConfig::is_private`]).
///
/// # Errors
///
/// Returns [`ConfigError::InvariantViolation`] if the name is empty or
/// contains a disallowed character.
pub fn validate_task_name(name: &str, context: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::InvariantViolation(format!(
            "{context}: task name must be non-empty"
        )));
    }
    if !name.chars().all(is_identifier_char) {
        return Err(ConfigError::InvariantViolation(format!(
            "{context}: task name '{name}' must match [A-Za-z0-9_-]+"
        )));
    }
    Ok(())
}

/// Validate a `python` version specifier.
///
/// Accepts an optional comparison operator (`>=`, `<=`, `==`, `~=`, `^`,
/// `>`, `<`) followed by one or more dot-separated numeric components
/// (e.g. `">=3.10"`, `"3.11"`, `"^3.12"`).
///
/// # Errors
///
/// Returns [`ConfigError::InvariantViolation`] if the specifier does not
/// match this shape.
pub fn validate_python_version(spec: &str, context: &str) -> Result<(), ConfigError> {
    const OPERATORS: &[&str] = &[">=", "<=", "==", "~=", "^", ">", "<"];
    let rest = OPERATORS
        .iter()
        .find_map(|op| spec.strip_prefix(op))
        .unwrap_or(spec);
    let valid = !rest.is_empty()
        && rest
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
    if !valid {
        return Err(ConfigError::InvariantViolation(format!(
            "{context}: invalid python version specifier '{spec}'"
        )));
    }
    Ok(())
}

/// Declarative gating condition attached to a task (C9).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    /// Admit iff the running platform's identifier is in this set.
    #[serde(default)]
    pub platforms: Vec<String>,
    /// Admit iff every listed environment variable is present.
    #[serde(default)]
    pub env_set: Vec<String>,
    /// Admit iff none of the listed environment variables are present.
    #[serde(default)]
    pub env_not_set: Vec<String>,
    /// Admit iff every listed variable is truthy (`1`/`true`/`yes`/`on`, case-insensitive).
    #[serde(default)]
    pub env_true: Vec<String>,
    /// Admit iff every listed variable equals the given value exactly.
    #[serde(default)]
    pub env_equals: HashMap<String, String>,
    /// Admit iff every listed path exists (relative to the project root).
    #[serde(default)]
    pub files_exist: Vec<String>,
    /// Admit iff none of the listed paths exist (relative to the project root).
    #[serde(default)]
    pub files_not_exist: Vec<String>,
}

/// The four hook slots a task may attach.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Hooks {
    /// Run before the task's subprocess is spawned.
    pub before_task: Option<String>,
    /// Run after a successful (exit 0) task.
    pub after_success: Option<String>,
    /// Run after a failed (non-ignored, non-zero exit) task.
    pub after_failure: Option<String>,
    /// Run unconditionally after the task concludes, if its subprocess was spawned.
    pub after_task: Option<String>,
}

/// Raw, as-written task definition from `[tasks.<name>]`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    /// Name of another task this one inherits from.
    pub extend: Option<String>,
    /// Path to a source file to run via the isolated runner.
    pub script: Option<String>,
    /// Shell command string to run.
    pub cmd: Option<String>,
    /// Arguments appended to the invocation.
    #[serde(default)]
    pub args: Vec<String>,
    /// Package specifiers, or dependency-group names.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Environment variables to set for the task.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Directories prepended to `PYTHONPATH`.
    #[serde(default)]
    pub pythonpath: Vec<String>,
    /// Names of tasks this one depends on.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Whether `depends_on` tasks may be dispatched concurrently.
    pub parallel: Option<bool>,
    /// Interpreter version specifier.
    pub python: Option<String>,
    /// Working directory for the subprocess.
    pub cwd: Option<String>,
    /// Timeout in seconds; must be > 0 (I7).
    pub timeout: Option<u64>,
    /// Non-zero exit does not fail the run or invoke the error handler.
    pub ignore_errors: Option<bool>,
    /// Declarative gating condition.
    pub condition: Option<Condition>,
    /// Path to a script whose exit code gates the task.
    pub condition_script: Option<String>,
    /// Alternative names for this task.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Tag strings.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Single category tag.
    pub category: Option<String>,
    /// Auxiliary hook scripts.
    #[serde(default)]
    pub hooks: Hooks,
    /// Free-form description shown by `list --verbose`.
    pub description: Option<String>,
}

impl TaskConfig {
    /// A task is private iff its name (not alias) starts with `_`.
    #[must_use]
    pub fn is_private(name: &str) -> bool {
        name.starts_with('_')
    }
}

/// Raw profile overlay from `[profiles.<name>]`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    /// Environment variables overlaid after the profile's `env_files`.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Env files parsed in declared order before `env`.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Interpreter version, overriding the project-level default.
    pub python: Option<String>,
    /// Dependency groups overriding the global `[dependencies]` map.
    #[serde(default)]
    pub dependencies: HashMap<String, Vec<String>>,
}

/// Failure-handling mode for a scheduler run (C8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnFailure {
    /// Cancel not-yet-started tasks on the first failure.
    #[default]
    FailFast,
    /// Stop dispatching new tasks but let in-flight tasks finish.
    Wait,
    /// Ignore failures for scheduling purposes; report an aggregate at the end.
    Continue,
}

/// Output-capture mode for a scheduler run (C8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Capture each task's output fully, emitted contiguously on completion.
    #[default]
    Buffered,
    /// Stream output live, each line prefixed by task name.
    Interleaved,
}

/// A single ordered stage of a pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    /// Task names dispatched in this stage.
    pub tasks: Vec<String>,
    /// Whether this stage's tasks run concurrently.
    #[serde(default)]
    pub parallel: bool,
}

/// Raw pipeline definition from `[pipelines.<name>]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Ordered stages.
    pub stages: Vec<StageConfig>,
    /// Failure-handling mode applied across stages.
    #[serde(default)]
    pub on_failure: OnFailure,
    /// Output-capture mode applied within each stage.
    #[serde(default)]
    pub output: OutputMode,
}

/// Raw `[project]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Human-readable project name.
    pub name: Option<String>,
    /// Default interpreter version for all tasks.
    pub python: Option<String>,
    /// Profile selected when none is given on the CLI or via `PT_PROFILE`.
    pub default_profile: Option<String>,
    /// Task invoked (non-recursively) when any other task fails.
    pub on_error_task: Option<String>,
    /// Env files parsed (in order) before the global `[env]` table.
    #[serde(default)]
    pub env_files: Vec<String>,
}

/// The full, as-parsed config file (`pt.toml`, or `[tool.pt]` in `pyproject.toml`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    /// Project-wide settings.
    #[serde(default)]
    pub project: ProjectConfig,
    /// Global environment variables.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Named dependency groups, referenced by name from a task's `dependencies`.
    #[serde(default)]
    pub dependencies: HashMap<String, Vec<String>>,
    /// Task definitions, keyed by name.
    #[serde(default)]
    pub tasks: HashMap<String, TaskConfig>,
    /// Profile definitions, keyed by name.
    #[serde(default)]
    pub profiles: HashMap<String, ProfileConfig>,
    /// Pipeline definitions, keyed by name.
    #[serde(default)]
    pub pipelines: HashMap<String, PipelineConfig>,
}

/// Wrapper matching `pyproject.toml`'s `[tool.pt]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct PyProjectTool {
    /// The `[tool]` table.
    pub tool: PyProjectToolInner,
}

/// The `[tool]` table of a `pyproject.toml`, holding only the `pt` key we care about.
#[derive(Debug, Clone, Deserialize)]
pub struct PyProjectToolInner {
    /// The `[tool.pt]` table, structurally identical to a standalone `pt.toml`.
    pub pt: RawConfig,
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn validate_tag_accepts_valid() {
        assert!(validate_tag("fast-test_1", "ctx").is_ok());
    }

    #[test]
    fn validate_tag_rejects_empty() {
        assert!(validate_tag("", "ctx").is_err());
    }

    #[test]
    fn validate_tag_rejects_invalid_char() {
        assert!(validate_tag("has space", "ctx").is_err());
        assert!(validate_tag("has.dot", "ctx").is_err());
    }

    #[test]
    fn validate_task_name_allows_leading_underscore() {
        assert!(validate_task_name("_private", "ctx").is_ok());
    }

    #[test]
    fn validate_python_version_accepts_common_forms() {
        assert!(validate_python_version(">=3.10", "ctx").is_ok());
        assert!(validate_python_version("3.11", "ctx").is_ok());
        assert!(validate_python_version("^3.12", "ctx").is_ok());
        assert!(validate_python_version("==3.9.2", "ctx").is_ok());
    }

    #[test]
    fn validate_python_version_rejects_garbage() {
        assert!(validate_python_version("latest", "ctx").is_err());
        assert!(validate_python_version(">=", "ctx").is_err());
        assert!(validate_python_version("3.x", "ctx").is_err());
    }

    #[test]
    fn task_is_private_iff_leading_underscore() {
        assert!(TaskConfig::is_private("_hidden"));
        assert!(!TaskConfig::is_private("visible"));
    }

    #[test]
    fn deserialize_minimal_task() {
        let toml = r#"
            cmd = "echo hi"
        "#;
        let task: TaskConfig = toml::from_str(toml).unwrap();
        assert_eq!(task.cmd.as_deref(), Some("echo hi"));
        assert!(task.args.is_empty());
    }

    #[test]
    fn deserialize_rejects_unknown_field() {
        let toml = r#"
            cmd = "echo hi"
            bogus = true
        "#;
        let result: Result<TaskConfig, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn deserialize_condition() {
        let toml = r#"
            platforms = ["linux", "darwin"]
            env_set = ["CI"]
        "#;
        let cond: Condition = toml::from_str(toml).unwrap();
        assert_eq!(cond.platforms, vec!["linux", "darwin"]);
        assert_eq!(cond.env_set, vec!["CI"]);
        assert!(cond.env_not_set.is_empty());
    }

    #[test]
    fn deserialize_on_failure_kebab_case() {
        assert_eq!(
            toml::from_str::<OnFailure>("\"fail-fast\"").unwrap(),
            OnFailure::FailFast
        );
        assert_eq!(
            toml::from_str::<OnFailure>("\"continue\"").unwrap(),
            OnFailure::Continue
        );
    }

    #[test]
    fn deserialize_full_pipeline() {
        let toml = r#"
            on_failure = "wait"
            output = "interleaved"

            [[stages]]
            tasks = ["a", "b"]
            parallel = true

            [[stages]]
            tasks = ["c"]
        "#;
        let pipeline: PipelineConfig = toml::from_str(toml).unwrap();
        assert_eq!(pipeline.stages.len(), 2);
        assert!(pipeline.stages[0].parallel);
        assert!(!pipeline.stages[1].parallel);
        assert_eq!(pipeline.on_failure, OnFailure::Wait);
        assert_eq!(pipeline.output, OutputMode::Interleaved);
    }

    #[test]
    fn deserialize_full_raw_config() {
        let toml = r#"
            [project]
            name = "demo"
            default_profile = "dev"

            [env]
            GLOBAL = "1"

            [dependencies]
            web = ["requests", "flask"]

            [tasks.build]
            cmd = "echo build"

            [tasks.test]
            extend = "build"
            tags = ["ci"]

            [profiles.dev]
            env = { X = "1" }

            [pipelines.release]
            [[pipelines.release.stages]]
            tasks = ["build", "test"]
        "#;
        let cfg: RawConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.project.name.as_deref(), Some("demo"));
        assert_eq!(cfg.tasks.len(), 2);
        assert_eq!(cfg.dependencies["web"], vec!["requests", "flask"]);
        assert_eq!(cfg.profiles["dev"].env["X"], "1");
        assert_eq!(cfg.pipelines["release"].stages[0].tasks, vec!["build", "test"]);
    }
}
