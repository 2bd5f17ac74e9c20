//! `pt watch <task>` — re-run a task whenever matching files change.
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{RecvTimeoutError, channel};
use std::time::Duration;

use anyhow::Result;
use glob::Pattern;
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;

use crate::cli::{GlobalOpts, WatchOpts};
use crate::logging::Logger;
use crate::tasks::run_single;

use super::build_context;

/// # Errors
///
/// Returns an error if configuration cannot be loaded or the watcher cannot
/// be installed.
pub fn run(global: &GlobalOpts, opts: &WatchOpts, log: &Arc<Logger>) -> Result<i32> {
    let ctx = build_context(global, log)?;
    if ctx.config.find_task(&opts.task).is_none() {
        anyhow::bail!("task '{}' not found", opts.task);
    }

    let patterns = compile_patterns(&opts.pattern);
    let ignores = compile_patterns(&opts.ignore);

    let (tx, rx) = channel();
    let mut debouncer = new_debouncer(Duration::from_secs(opts.debounce.max(1)), tx)?;
    debouncer
        .watcher()
        .watch(&ctx.config.root, RecursiveMode::Recursive)?;

    log.stage(&format!("watching {} for changes to '{}'", ctx.config.root.display(), opts.task));
    run_once(&opts.task, &ctx, log, opts.no_clear);

    loop {
        if crate::interrupt::is_requested() {
            break;
        }
        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(Ok(events)) => {
                let changed = events
                    .iter()
                    .any(|e| path_matches(&e.path, &ctx.config.root, &patterns, &ignores));
                if changed {
                    run_once(&opts.task, &ctx, log, opts.no_clear);
                }
            }
            Ok(Err(errors)) => {
                for e in errors {
                    log.warn(&format!("watch error: {e}"));
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(0)
}

fn run_once(task: &str, ctx: &crate::tasks::RunContext, log: &Arc<Logger>, no_clear: bool) {
    if !no_clear {
        print_clear();
    }
    let _outcome = run_single(task, ctx, log);
    log.print_summary();
}

/// Clear the terminal screen. Not routed through `Logger` since it is a raw
/// control sequence, not a log message.
fn print_clear() {
    use std::io::Write as _;
    let _ = write!(std::io::stdout(), "\x1b[2J\x1b[H");
    let _ = std::io::stdout().flush();
}

fn compile_patterns(raw: &[String]) -> Vec<Pattern> {
    raw.iter().filter_map(|p| Pattern::new(p).ok()).collect()
}

fn path_matches(path: &Path, root: &Path, patterns: &[Pattern], ignores: &[Pattern]) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    if ignores.iter().any(|p| p.matches_path(relative)) {
        return false;
    }
    if patterns.is_empty() {
        return true;
    }
    patterns.iter().any(|p| p.matches_path(relative))
}
