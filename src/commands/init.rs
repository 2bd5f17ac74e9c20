//! `pt init` — scaffold a minimal `pt.toml` in the current directory.
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::cli::InitOpts;
use crate::logging::Logger;

const TEMPLATE: &str = r#"[project]
name = "project"

[tasks.hello]
cmd = "echo hello"
description = "Sanity-check task"
"#;

/// # Errors
///
/// Returns an error if `pt.toml` already exists and `--force` was not given,
/// or if the file cannot be written.
pub fn run(opts: &InitOpts, log: &Arc<Logger>) -> Result<i32> {
    let path = std::env::current_dir()?.join("pt.toml");
    if path.exists() && !opts.force {
        anyhow::bail!("{} already exists; pass --force to overwrite", path.display());
    }
    std::fs::write(&path, TEMPLATE).with_context(|| format!("writing {}", path.display()))?;
    log.info(&format!("wrote {}", path.display()));
    Ok(0)
}
