//! `pt exec <script>` — run a standalone script file via the isolated
//! runner without requiring it to be declared in `pt.toml`.
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use crate::cli::{ExecOpts, GlobalOpts};
use crate::config::loader::{EffectiveTask, TaskKind};
use crate::config::schema::Hooks;
use crate::logging::Logger;
use crate::platform::Platform;
use crate::tasks::orchestrator::run_task;

use super::{build_context, exit_code_for};

/// # Errors
///
/// Returns an error if configuration cannot be loaded or the script path
/// does not exist.
pub fn run(global: &GlobalOpts, opts: &ExecOpts, log: &Arc<Logger>) -> Result<i32> {
    let ctx = build_context(global, log)?;
    if !opts.script.is_file() {
        anyhow::bail!("script '{}' not found", opts.script.display());
    }
    let name = opts
        .script
        .file_stem()
        .map_or_else(|| opts.script.display().to_string(), |s| s.to_string_lossy().into_owned());

    let mut env = HashMap::new();
    env.insert("PT_TASK_NAME".to_string(), name.clone());
    env.insert(
        "PT_PROJECT_ROOT".to_string(),
        ctx.config.root.display().to_string(),
    );
    env.insert("PT_CI".to_string(), Platform::detect().is_ci().to_string());

    let task = EffectiveTask {
        name,
        kind: TaskKind::Script(opts.script.display().to_string()),
        args: opts.args.clone(),
        dependencies: Vec::new(),
        env,
        pythonpath: Vec::new(),
        depends_on: Vec::new(),
        parallel: false,
        python: ctx.config.project.python.clone(),
        cwd: None,
        timeout: None,
        ignore_errors: false,
        condition: None,
        condition_script: None,
        aliases: Vec::new(),
        tags: Vec::new(),
        category: None,
        hooks: Hooks::default(),
        description: String::new(),
        private: false,
    };

    let outcome = run_task(&task, &ctx, log.as_ref(), false);
    log.print_summary();
    Ok(exit_code_for(std::slice::from_ref(&outcome)))
}
