//! Top-level command handlers for run, exec, multi, pipeline, watch, list,
//! tags, check, and init.
pub mod check;
pub mod exec;
pub mod init;
pub mod list;
pub mod multi;
pub mod pipeline;
pub mod run;
pub mod tags;
pub mod watch;

use std::sync::Arc;

use anyhow::Result;

use crate::cli::GlobalOpts;
use crate::config::{EffectiveConfig, EffectiveTask, load, load_file};
use crate::exec::SystemExecutor;
use crate::logging::{Logger, TaskStatus};
use crate::platform::Platform;
use crate::tasks::{RunContext, TaskOutcome};

/// Resolve and load configuration, honoring `--config`/`--profile`, and
/// build the [`RunContext`] shared by every command.
///
/// # Errors
///
/// Returns an error if the config cannot be discovered, parsed, or resolved.
pub fn build_context(global: &GlobalOpts, log: &Logger) -> Result<RunContext> {
    let platform = Platform::detect();
    let config = match &global.config {
        Some(path) => load_file(path, global.profile.as_deref(), &platform)?,
        None => {
            let cwd = std::env::current_dir()?;
            load(&cwd, global.profile.as_deref(), &platform)?
        }
    };
    log.debug(&format!(
        "resolved config at {}",
        config.config_file.display()
    ));
    let executor: Arc<dyn crate::exec::Executor> = Arc::new(SystemExecutor);
    Ok(RunContext::new(Arc::new(config), Arc::new(platform), executor))
}

/// Resolve an explicit task list, or select tasks by tag/category when none
/// are named. Private tasks (leading `_`) are only included when named
/// explicitly.
///
/// # Errors
///
/// Returns an error if an explicitly named task does not exist, or if a
/// tag/category selection matches nothing.
pub fn select_tasks(
    config: &EffectiveConfig,
    explicit: &[String],
    tags: &[String],
    match_any: bool,
    category: Option<&str>,
) -> Result<Vec<String>> {
    if !explicit.is_empty() {
        for name in explicit {
            if config.find_task(name).is_none() {
                anyhow::bail!("task '{name}' not found");
            }
        }
        return Ok(explicit.to_vec());
    }

    let mut names: Vec<String> = config
        .tasks
        .values()
        .filter(|t| !t.private)
        .filter(|t| category.is_none_or(|c| t.category.as_deref() == Some(c)))
        .filter(|t| tag_matches(t, tags, match_any))
        .map(|t| t.name.clone())
        .collect();
    names.sort();
    if names.is_empty() {
        anyhow::bail!("no tasks matched the given tag/category selection");
    }
    Ok(names)
}

fn tag_matches(task: &EffectiveTask, tags: &[String], match_any: bool) -> bool {
    if tags.is_empty() {
        return true;
    }
    if match_any {
        tags.iter().any(|t| task.tags.contains(t))
    } else {
        tags.iter().all(|t| task.tags.contains(t))
    }
}

/// Clone `ctx`'s config with `extra_args` appended to the named task's own
/// `args`, so CLI-trailing arguments (`run foo -- --flag`) reach the task's
/// invocation. Returns `ctx` unchanged (cheaply cloned) if there are none.
#[must_use]
pub fn context_with_extra_args(ctx: &RunContext, task_name: &str, extra_args: &[String]) -> RunContext {
    if extra_args.is_empty() {
        return ctx.clone();
    }
    let mut config = (*ctx.config).clone();
    let canonical = config
        .tasks
        .contains_key(task_name)
        .then(|| task_name.to_string())
        .or_else(|| config.aliases.get(task_name).cloned());
    if let Some(name) = canonical
        && let Some(task) = config.tasks.get_mut(&name)
    {
        task.args.extend(extra_args.iter().cloned());
    }
    RunContext {
        config: Arc::new(config),
        platform: Arc::clone(&ctx.platform),
        executor: Arc::clone(&ctx.executor),
        runner_tool: ctx.runner_tool.clone(),
    }
}

/// Translate a run's accumulated task outcomes into a process exit code:
/// `130` if interrupted, `124` if any task timed out, `1` if any task
/// otherwise failed, `0` if every task succeeded, was skipped, or ignored.
#[must_use]
pub fn exit_code_for(outcomes: &[TaskOutcome]) -> i32 {
    if crate::interrupt::is_requested() {
        130
    } else if outcomes.iter().any(|o| o.status == TaskStatus::Timeout) {
        124
    } else if outcomes.iter().any(TaskOutcome::failed) {
        1
    } else {
        0
    }
}
