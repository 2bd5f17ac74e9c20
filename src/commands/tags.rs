//! `pt tags` — print the set of distinct tags across all tasks.
use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;

use crate::cli::GlobalOpts;
use crate::logging::Logger;

use super::build_context;

/// # Errors
///
/// Returns an error if configuration cannot be loaded.
pub fn run(global: &GlobalOpts, log: &Arc<Logger>) -> Result<i32> {
    let ctx = build_context(global, log)?;
    let tags: BTreeSet<&str> = ctx
        .config
        .tasks
        .values()
        .flat_map(|t| t.tags.iter().map(String::as_str))
        .collect();

    if tags.is_empty() {
        log.info("no tags defined");
    } else {
        for tag in tags {
            log.info(tag);
        }
    }
    Ok(0)
}
