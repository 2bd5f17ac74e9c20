//! `pt list` — list resolved task names.
use std::sync::Arc;

use anyhow::Result;

use crate::cli::{GlobalOpts, ListOpts};
use crate::config::EffectiveTask;
use crate::logging::Logger;

use super::build_context;

/// # Errors
///
/// Returns an error if configuration cannot be loaded.
pub fn run(global: &GlobalOpts, opts: &ListOpts, log: &Arc<Logger>) -> Result<i32> {
    let ctx = build_context(global, log)?;

    let mut tasks: Vec<&EffectiveTask> = ctx
        .config
        .tasks
        .values()
        .filter(|task| {
            (opts.all || !task.private)
                && opts
                    .category
                    .as_deref()
                    .is_none_or(|c| task.category.as_deref() == Some(c))
                && tag_matches(&task.tags, &opts.tag, opts.match_any)
        })
        .collect();
    tasks.sort_by(|a, b| a.name.cmp(&b.name));

    if tasks.is_empty() {
        log.info("no tasks match the given filters");
        return Ok(0);
    }

    for task in tasks {
        if opts.verbose {
            let deps = if task.depends_on.is_empty() {
                String::new()
            } else {
                format!(" [depends: {}]", task.depends_on.join(", "))
            };
            let desc = if task.description.is_empty() {
                String::new()
            } else {
                format!(" - {}", task.description)
            };
            log.info(&format!("{}{desc}{deps}", task.name));
        } else {
            log.info(&task.name);
        }
    }
    Ok(0)
}

fn tag_matches(task_tags: &[String], wanted: &[String], match_any: bool) -> bool {
    if wanted.is_empty() {
        return true;
    }
    if match_any {
        wanted.iter().any(|t| task_tags.contains(t))
    } else {
        wanted.iter().all(|t| task_tags.contains(t))
    }
}
