//! `pt check` — load and validate configuration without executing anything.
use std::sync::Arc;

use anyhow::Result;

use crate::cli::GlobalOpts;
use crate::logging::Logger;

use super::build_context;

/// # Errors
///
/// Returns an error if configuration cannot be loaded, parsed, or resolved.
pub fn run(global: &GlobalOpts, log: &Arc<Logger>) -> Result<i32> {
    let ctx = build_context(global, log)?;
    log.info(&format!(
        "config ok: {} ({} task{}, {} pipeline{})",
        ctx.config.config_file.display(),
        ctx.config.tasks.len(),
        if ctx.config.tasks.len() == 1 { "" } else { "s" },
        ctx.config.pipelines.len(),
        if ctx.config.pipelines.len() == 1 { "" } else { "s" },
    ));
    Ok(0)
}
