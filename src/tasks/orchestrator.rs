//! Single-task execution orchestration: condition gating, hooks, status
//! classification, and error-handler dispatch (C7).
use crate::config::EffectiveTask;
use crate::exec::TIMEOUT_EXIT_CODE;
use crate::logging::{Log, TaskStatus};

use super::builder;
use super::condition::{self, Verdict};
use super::context::RunContext;

/// Hook-type values injected as `PT_HOOK_TYPE` (spec.md §6, glossary).
const HOOK_BEFORE_TASK: &str = "before_task";
const HOOK_AFTER_SUCCESS: &str = "after_success";
const HOOK_AFTER_FAILURE: &str = "after_failure";
const HOOK_AFTER_TASK: &str = "after_task";

/// Maximum number of trailing stderr lines captured for an error-handler's
/// `PT_ERROR_STDERR`.
const STDERR_TAIL_LINES: usize = 20;

/// Outcome of running one task end to end, including tasks that never
/// spawned a subprocess (condition denied, hook failure, dependency
/// failure).
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    /// Canonical task name.
    pub name: String,
    /// Final status.
    pub status: TaskStatus,
    /// Human-readable detail (skip reason, exit code, stderr tail).
    pub message: Option<String>,
    /// Whether the task's subprocess was actually spawned.
    pub spawned: bool,
}

impl TaskOutcome {
    fn unspawned(name: &str, status: TaskStatus, message: String) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: Some(message),
            spawned: false,
        }
    }

    /// Build the outcome for a task cancelled before it started (fail-fast
    /// scheduling of a sibling task/group).
    #[must_use]
    pub fn cancelled(name: &str) -> Self {
        Self::unspawned(name, TaskStatus::Skipped, "cancelled".to_string())
    }

    /// Whether this outcome counts as a failure for scheduling purposes.
    #[must_use]
    pub fn failed(&self) -> bool {
        matches!(self.status, TaskStatus::Failed | TaskStatus::Timeout)
    }
}

/// Run `task` to completion: evaluate its condition, run `before_task`,
/// build and execute its invocation, classify the result, run the
/// appropriate `after_*` hooks, record the outcome, and (unless `task`
/// itself is the error handler) dispatch the project's `on_error_task` on
/// failure.
pub fn run_task(task: &EffectiveTask, ctx: &RunContext, log: &dyn Log, is_error_handler: bool) -> TaskOutcome {
    if let Verdict::Denied(reason) = condition::evaluate(task, ctx) {
        log.record_task(&task.name, TaskStatus::Skipped, Some(&reason));
        return TaskOutcome::unspawned(&task.name, TaskStatus::Skipped, reason);
    }

    if let Some(hook) = &task.hooks.before_task {
        if !run_hook(hook, task, ctx, HOOK_BEFORE_TASK, None) {
            let reason = "before_task hook failed".to_string();
            log.record_task(&task.name, TaskStatus::Skipped, Some(&reason));
            return TaskOutcome::unspawned(&task.name, TaskStatus::Skipped, reason);
        }
    }

    let invocation = match builder::build(task, ctx) {
        Ok(inv) => inv,
        Err(e) => {
            let msg = e.to_string();
            log.record_task(&task.name, TaskStatus::Failed, Some(&msg));
            return TaskOutcome::unspawned(&task.name, TaskStatus::Failed, msg);
        }
    };

    let run_result = ctx.executor.run(&invocation);
    let (status, message, exit_code, stderr_tail) = classify(task, &run_result);

    if let Ok(result) = &run_result {
        for line in result.stdout.lines() {
            log.info(&format!("[{}] {line}", task.name));
        }
        for line in result.stderr.lines() {
            log.warn(&format!("[{}] {line}", task.name));
        }
    }

    run_after_hooks(task, ctx, status, exit_code);
    log.record_task(&task.name, status, message.as_deref());

    if status == TaskStatus::Failed && !is_error_handler {
        dispatch_error_handler(task, ctx, log, exit_code.unwrap_or(-1), &stderr_tail);
    }

    TaskOutcome {
        name: task.name.clone(),
        status,
        message,
        spawned: true,
    }
}

/// Classify a completed subprocess run into a `(status, message, exit_code,
/// stderr_tail)` tuple.
fn classify(
    task: &EffectiveTask,
    run_result: &anyhow::Result<crate::exec::ExecResult>,
) -> (TaskStatus, Option<String>, Option<i32>, String) {
    match run_result {
        Ok(result) if result.timed_out => (
            TaskStatus::Timeout,
            Some(format!(
                "timed out after {}s",
                task.timeout.unwrap_or(0)
            )),
            Some(TIMEOUT_EXIT_CODE),
            tail(&result.stderr),
        ),
        Ok(result) if result.success => (TaskStatus::Ok, None, result.code, String::new()),
        Ok(result) => {
            let code = result.code.unwrap_or(-1);
            let stderr_tail = tail(&result.stderr);
            if task.ignore_errors {
                (
                    TaskStatus::Ignored,
                    Some(format!("exit {code} (ignored)")),
                    result.code,
                    stderr_tail,
                )
            } else {
                (
                    TaskStatus::Failed,
                    Some(format!("exit {code}")),
                    result.code,
                    stderr_tail,
                )
            }
        }
        Err(e) => (TaskStatus::Failed, Some(e.to_string()), None, String::new()),
    }
}

/// Keep only the trailing `STDERR_TAIL_LINES` lines of `stderr`.
fn tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    if lines.len() <= STDERR_TAIL_LINES {
        stderr.to_string()
    } else {
        lines[lines.len() - STDERR_TAIL_LINES..].join("\n")
    }
}

fn run_after_hooks(task: &EffectiveTask, ctx: &RunContext, status: TaskStatus, exit_code: Option<i32>) {
    match status {
        TaskStatus::Ok => {
            if let Some(h) = &task.hooks.after_success {
                run_hook(h, task, ctx, HOOK_AFTER_SUCCESS, exit_code);
            }
        }
        TaskStatus::Failed | TaskStatus::Timeout | TaskStatus::Ignored => {
            if let Some(h) = &task.hooks.after_failure {
                run_hook(h, task, ctx, HOOK_AFTER_FAILURE, exit_code);
            }
        }
        TaskStatus::Skipped => {}
    }
    if let Some(h) = &task.hooks.after_task {
        run_hook(h, task, ctx, HOOK_AFTER_TASK, exit_code);
    }
}

/// Run a lifecycle hook script, returning whether it exited zero.
fn run_hook(
    script: &str,
    task: &EffectiveTask,
    ctx: &RunContext,
    hook_type: &str,
    exit_code: Option<i32>,
) -> bool {
    let mut env = task.env.clone();
    builder::apply_pythonpath(&mut env, &task.pythonpath);
    env.insert("PT_HOOK_TYPE".to_string(), hook_type.to_string());
    if let Some(code) = exit_code {
        env.insert("PT_TASK_EXIT_CODE".to_string(), code.to_string());
    }
    let cwd = task
        .cwd
        .as_deref()
        .map(|c| builder::resolve_path(&ctx.config.root, c));
    let script_path = builder::resolve_path(&ctx.config.root, script);
    ctx.executor
        .run_hook(&script_path, cwd.as_deref(), &env)
        .map(|r| r.success)
        .unwrap_or(false)
}

/// Invoke the project's `on_error_task`, if configured, with
/// `PT_FAILED_TASK`/`PT_ERROR_CODE`/`PT_ERROR_STDERR` injected. Guards
/// against the handler re-triggering itself (design note, §9 open
/// question): a handler task is always run with `is_error_handler = true`,
/// so its own failure never recurses, and it is never invoked to handle
/// its own failure.
fn dispatch_error_handler(
    task: &EffectiveTask,
    ctx: &RunContext,
    log: &dyn Log,
    exit_code: i32,
    stderr_tail: &str,
) {
    let Some(handler_name) = &ctx.config.project.on_error_task else {
        return;
    };
    let Some(handler) = ctx.config.find_task(handler_name) else {
        return;
    };
    if handler.name == task.name {
        return;
    }
    let mut handler = handler.clone();
    handler
        .env
        .insert("PT_FAILED_TASK".to_string(), task.name.clone());
    handler
        .env
        .insert("PT_ERROR_CODE".to_string(), exit_code.to_string());
    handler
        .env
        .insert("PT_ERROR_STDERR".to_string(), stderr_tail.to_string());
    log.warn(&format!(
        "task '{}' failed; invoking error handler '{}'",
        task.name, handler.name
    ));
    run_task(&handler, ctx, log, true);
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::loader::test_helpers::{empty_effective_config, minimal_task};
    use crate::config::loader::TaskKind;
    use crate::exec::SystemExecutor;
    use crate::logging::Logger;
    use crate::platform::{Os, Platform};
    use std::sync::Arc;

    fn ctx_with(mut config: crate::config::EffectiveConfig) -> RunContext {
        let _ = &mut config;
        RunContext::new(
            Arc::new(config),
            Arc::new(Platform::new(Os::Linux)),
            Arc::new(SystemExecutor),
        )
    }

    fn cmd_task(name: &str, cmd: &str) -> EffectiveTask {
        let mut t = minimal_task(name);
        t.kind = TaskKind::Cmd(cmd.to_string());
        t
    }

    #[test]
    fn successful_task_reports_ok() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = empty_effective_config(dir.path().to_path_buf());
        let task = cmd_task("ok-task", "true");
        config.tasks.insert(task.name.clone(), task.clone());
        let ctx = ctx_with(config);
        let log = Logger::new("test");
        let outcome = run_task(&task, &ctx, &log, false);
        assert_eq!(outcome.status, TaskStatus::Ok);
        assert!(outcome.spawned);
    }

    #[test]
    fn failing_task_reports_failed_and_no_ignore() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = empty_effective_config(dir.path().to_path_buf());
        let task = cmd_task("bad-task", "false");
        config.tasks.insert(task.name.clone(), task.clone());
        let ctx = ctx_with(config);
        let log = Logger::new("test");
        let outcome = run_task(&task, &ctx, &log, false);
        assert_eq!(outcome.status, TaskStatus::Failed);
    }

    #[test]
    fn ignore_errors_downgrades_failure_to_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = empty_effective_config(dir.path().to_path_buf());
        let mut task = cmd_task("flaky", "false");
        task.ignore_errors = true;
        config.tasks.insert(task.name.clone(), task.clone());
        let ctx = ctx_with(config);
        let log = Logger::new("test");
        let outcome = run_task(&task, &ctx, &log, false);
        assert_eq!(outcome.status, TaskStatus::Ignored);
    }

    #[test]
    fn denied_condition_skips_without_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = empty_effective_config(dir.path().to_path_buf());
        let mut task = cmd_task("gated", "true");
        task.condition = Some(crate::config::Condition {
            env_set: vec!["PT_TEST_DEFINITELY_UNSET_VAR".to_string()],
            ..Default::default()
        });
        config.tasks.insert(task.name.clone(), task.clone());
        let ctx = ctx_with(config);
        let log = Logger::new("test");
        let outcome = run_task(&task, &ctx, &log, false);
        assert_eq!(outcome.status, TaskStatus::Skipped);
        assert!(!outcome.spawned);
    }

    #[test]
    fn error_handler_is_invoked_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("handled");
        let mut config = empty_effective_config(dir.path().to_path_buf());
        let task = cmd_task("bad", "false");
        let handler = cmd_task("on_error", &format!("touch {}", marker.display()));
        config.tasks.insert(task.name.clone(), task.clone());
        config.tasks.insert(handler.name.clone(), handler);
        config.project.on_error_task = Some("on_error".to_string());
        let ctx = ctx_with(config);
        let log = Logger::new("test");
        run_task(&task, &ctx, &log, false);
        assert!(marker.exists());
    }

    #[test]
    #[cfg(unix)]
    fn hook_inherits_derived_pythonpath() {
        use std::os::unix::fs::PermissionsExt as _;
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("pythonpath-seen");
        let hook = dir.path().join("hook.sh");
        std::fs::write(
            &hook,
            format!("#!/bin/sh\necho \"$PYTHONPATH\" > {}\n", marker.display()),
        )
        .unwrap();
        std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();
        let mut config = empty_effective_config(dir.path().to_path_buf());
        let mut task = cmd_task("with-pythonpath", "true");
        task.pythonpath = vec!["/extra/pylib".to_string()];
        task.hooks.before_task = Some(hook.display().to_string());
        config.tasks.insert(task.name.clone(), task.clone());
        let ctx = ctx_with(config);
        let log = Logger::new("test");
        run_task(&task, &ctx, &log, false);
        let seen = std::fs::read_to_string(&marker).unwrap();
        assert!(seen.contains("/extra/pylib"), "hook env was missing PYTHONPATH: {seen:?}");
    }

    #[test]
    fn error_handler_never_recurses_on_itself() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = empty_effective_config(dir.path().to_path_buf());
        let handler = cmd_task("on_error", "false");
        config.tasks.insert(handler.name.clone(), handler.clone());
        config.project.on_error_task = Some("on_error".to_string());
        let ctx = ctx_with(config);
        let log = Logger::new("test");
        // Running the handler itself as a failure must not re-dispatch itself.
        let outcome = run_task(&handler, &ctx, &log, true);
        assert_eq!(outcome.status, TaskStatus::Failed);
    }
}
