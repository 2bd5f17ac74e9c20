//! `pt multi` — run a flat list of tasks (explicit or tag/category-selected)
//! as one group.
use std::sync::Arc;

use anyhow::Result;

use crate::cli::{GlobalOpts, MultiOpts};
use crate::logging::Logger;
use crate::tasks::run_multi;

use super::{build_context, exit_code_for, select_tasks};

/// # Errors
///
/// Returns an error if configuration cannot be loaded or task selection
/// fails.
pub fn run(global: &GlobalOpts, opts: &MultiOpts, log: &Arc<Logger>) -> Result<i32> {
    let ctx = build_context(global, log)?;
    let names = select_tasks(
        &ctx.config,
        &opts.tasks,
        &opts.tag,
        opts.match_any,
        opts.category.as_deref(),
    )?;

    let outcomes = run_multi(
        &names,
        &ctx,
        log,
        opts.parallel_requested(),
        opts.on_failure,
        opts.output,
    );
    log.print_summary();
    Ok(exit_code_for(&outcomes))
}
