//! Declarative and script-based condition evaluation (C9).
use std::path::Path;

use crate::config::EffectiveTask;

use super::context::RunContext;

/// Result of gating a task against its `condition`/`condition_script`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The task is admitted to run.
    Admitted,
    /// The task is denied; carries a human-readable reason.
    Denied(String),
}

/// Truthy values recognized by `env_true` (case-insensitive).
const TRUTHY: &[&str] = &["1", "true", "yes", "on"];

/// Evaluate `task.condition` (all sub-conditions AND together).
fn evaluate_declarative(task: &EffectiveTask, ctx: &RunContext) -> Verdict {
    let Some(cond) = &task.condition else {
        return Verdict::Admitted;
    };

    if !cond.platforms.is_empty() && !cond.platforms.iter().any(|p| ctx.platform.matches(p)) {
        return Verdict::Denied(format!(
            "current platform '{}' not in {:?}",
            ctx.platform.os, cond.platforms
        ));
    }

    for var in &cond.env_set {
        if std::env::var_os(var).is_none() {
            return Verdict::Denied(format!("env var '{var}' is not set"));
        }
    }

    for var in &cond.env_not_set {
        if std::env::var_os(var).is_some() {
            return Verdict::Denied(format!("env var '{var}' is set"));
        }
    }

    for var in &cond.env_true {
        let value = std::env::var(var).unwrap_or_default();
        if !TRUTHY.iter().any(|t| t.eq_ignore_ascii_case(&value)) {
            return Verdict::Denied(format!("env var '{var}' is not truthy"));
        }
    }

    for (var, expected) in &cond.env_equals {
        let actual = std::env::var(var).unwrap_or_default();
        if &actual != expected {
            return Verdict::Denied(format!(
                "env var '{var}' = '{actual}', expected '{expected}'"
            ));
        }
    }

    for path in &cond.files_exist {
        if !ctx.config.root.join(path).exists() {
            return Verdict::Denied(format!("required file '{path}' does not exist"));
        }
    }

    for path in &cond.files_not_exist {
        if ctx.config.root.join(path).exists() {
            return Verdict::Denied(format!("forbidden file '{path}' exists"));
        }
    }

    Verdict::Admitted
}

/// Run `task.condition_script`, admitting the task iff it exits zero.
fn evaluate_script(task: &EffectiveTask, ctx: &RunContext) -> Verdict {
    let Some(script) = &task.condition_script else {
        return Verdict::Admitted;
    };
    let cwd: std::path::PathBuf = task
        .cwd
        .as_deref()
        .map_or_else(|| ctx.config.root.clone(), |c| ctx.config.root.join(c));
    let script_path = ctx.config.root.join(script);
    match ctx.executor.run_hook(&script_path, Some(cwd.as_path()), &task.env) {
        Ok(result) if result.success => Verdict::Admitted,
        Ok(result) => Verdict::Denied(format!(
            "condition_script '{script}' exited {}",
            result.code.unwrap_or(-1)
        )),
        Err(e) => Verdict::Denied(format!("condition_script '{script}' failed to run: {e}")),
    }
}

/// Evaluate both the declarative `condition` and `condition_script`; both
/// must admit for the task to run (spec.md §4.9).
#[must_use]
pub fn evaluate(task: &EffectiveTask, ctx: &RunContext) -> Verdict {
    match evaluate_declarative(task, ctx) {
        Verdict::Admitted => evaluate_script(task, ctx),
        denied => denied,
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::Condition;
    use crate::exec::SystemExecutor;
    use crate::platform::{Os, Platform};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn make_ctx(root: &Path, os: Os) -> RunContext {
        let config = crate::config::loader::test_helpers::empty_effective_config(root.to_path_buf());
        RunContext::new(Arc::new(config), Arc::new(Platform::new(os)), Arc::new(SystemExecutor))
    }

    fn task_with_condition(condition: Condition) -> EffectiveTask {
        let mut t = crate::config::loader::test_helpers::minimal_task("t");
        t.condition = Some(condition);
        t
    }

    #[test]
    fn no_condition_admits() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = make_ctx(dir.path(), Os::Linux);
        let task = crate::config::loader::test_helpers::minimal_task("t");
        assert_eq!(evaluate(&task, &ctx), Verdict::Admitted);
    }

    #[test]
    fn platform_mismatch_denies() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = make_ctx(dir.path(), Os::Darwin);
        let task = task_with_condition(Condition {
            platforms: vec!["linux".to_string()],
            ..Default::default()
        });
        assert!(matches!(evaluate(&task, &ctx), Verdict::Denied(_)));
    }

    #[test]
    fn platform_match_admits() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = make_ctx(dir.path(), Os::Linux);
        let task = task_with_condition(Condition {
            platforms: vec!["linux".to_string()],
            ..Default::default()
        });
        assert_eq!(evaluate(&task, &ctx), Verdict::Admitted);
    }

    #[test]
    fn env_set_denies_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = make_ctx(dir.path(), Os::Linux);
        let task = task_with_condition(Condition {
            env_set: vec!["PT_CONDITION_TEST_DEFINITELY_UNSET".to_string()],
            ..Default::default()
        });
        assert!(matches!(evaluate(&task, &ctx), Verdict::Denied(_)));
    }

    #[test]
    fn env_not_set_admits_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = make_ctx(dir.path(), Os::Linux);
        let task = task_with_condition(Condition {
            env_not_set: vec!["PT_CONDITION_TEST_DEFINITELY_UNSET".to_string()],
            ..Default::default()
        });
        assert_eq!(evaluate(&task, &ctx), Verdict::Admitted);
    }

    #[test]
    fn env_equals_checks_exact_match() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = make_ctx(dir.path(), Os::Linux);
        let mut map = HashMap::new();
        map.insert("PATH".to_string(), "definitely-not-the-real-path".to_string());
        let task = task_with_condition(Condition {
            env_equals: map,
            ..Default::default()
        });
        assert!(matches!(evaluate(&task, &ctx), Verdict::Denied(_)));
    }

    #[test]
    fn files_exist_checks_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), "").unwrap();
        let ctx = make_ctx(dir.path(), Os::Linux);
        let task = task_with_condition(Condition {
            files_exist: vec!["marker".to_string()],
            ..Default::default()
        });
        assert_eq!(evaluate(&task, &ctx), Verdict::Admitted);

        let task2 = task_with_condition(Condition {
            files_exist: vec!["nope".to_string()],
            ..Default::default()
        });
        assert!(matches!(evaluate(&task2, &ctx), Verdict::Denied(_)));
    }

    #[test]
    fn files_not_exist_denies_when_present() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), "").unwrap();
        let ctx = make_ctx(dir.path(), Os::Linux);
        let task = task_with_condition(Condition {
            files_not_exist: vec!["marker".to_string()],
            ..Default::default()
        });
        assert!(matches!(evaluate(&task, &ctx), Verdict::Denied(_)));
    }

    #[test]
    fn env_true_accepts_common_spellings() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = make_ctx(dir.path(), Os::Linux);
        // SAFETY: test-only, single-threaded for this variable name.
        #[allow(unsafe_code)]
        unsafe {
            std::env::set_var("PT_CONDITION_TRUE_TEST", "YES");
        }
        let task = task_with_condition(Condition {
            env_true: vec!["PT_CONDITION_TRUE_TEST".to_string()],
            ..Default::default()
        });
        let verdict = evaluate(&task, &ctx);
        #[allow(unsafe_code)]
        unsafe {
            std::env::remove_var("PT_CONDITION_TRUE_TEST");
        }
        assert_eq!(verdict, Verdict::Admitted);
    }
}
