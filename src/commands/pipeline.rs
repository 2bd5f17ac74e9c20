//! `pt pipeline <name>` — run a named pipeline's stages in order.
use std::sync::Arc;

use anyhow::Result;

use crate::cli::{GlobalOpts, PipelineOpts};
use crate::logging::Logger;
use crate::tasks::run_pipeline;

use super::{build_context, exit_code_for};

/// # Errors
///
/// Returns an error if configuration cannot be loaded or the pipeline does
/// not exist.
pub fn run(global: &GlobalOpts, opts: &PipelineOpts, log: &Arc<Logger>) -> Result<i32> {
    let ctx = build_context(global, log)?;
    let pipeline = ctx
        .config
        .pipelines
        .get(&opts.name)
        .ok_or_else(|| anyhow::anyhow!("pipeline '{}' not found", opts.name))?
        .clone();
    let outcomes = run_pipeline(&pipeline, &ctx, log);
    log.print_summary();
    Ok(exit_code_for(&outcomes))
}
