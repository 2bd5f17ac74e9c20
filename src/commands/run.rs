//! `pt run <task>` — run a single task and its dependency tree.
use std::sync::Arc;

use anyhow::Result;

use crate::cli::{GlobalOpts, RunOpts};
use crate::logging::Logger;
use crate::tasks::run_single;

use super::{build_context, context_with_extra_args, exit_code_for};

/// # Errors
///
/// Returns an error if configuration cannot be loaded.
pub fn run(global: &GlobalOpts, opts: &RunOpts, log: &Arc<Logger>) -> Result<i32> {
    let ctx = build_context(global, log)?;
    if ctx.config.find_task(&opts.task).is_none() {
        anyhow::bail!("task '{}' not found", opts.task);
    }
    let ctx = context_with_extra_args(&ctx, &opts.task, &opts.args);
    let outcome = run_single(&opts.task, &ctx, log);
    log.print_summary();
    Ok(exit_code_for(std::slice::from_ref(&outcome)))
}
