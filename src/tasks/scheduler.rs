//! Dependency-gated and flat-group task dispatch (C5 dispatch, C8).
//!
//! Two entry points share one mechanism: [`run_single`] walks a single
//! task's `depends_on` tree (used by `run`/`exec`), while [`run_multi`] and
//! [`run_pipeline`] dispatch a flat, externally supplied list of task names
//! (used by `multi` and pipeline stages). Both bottom out in [`dispatch`],
//! which fans a set of task names out either sequentially or, via Rayon,
//! concurrently, honoring `on_failure` and `output` mode.
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::config::schema::PipelineConfig;
use crate::config::{OnFailure, OutputMode};
use crate::logging::{BufferedLog, Log, Logger};

use super::context::RunContext;
use super::orchestrator::{self, TaskOutcome};

/// Memoizes task-tree results so that a dependency shared by more than one
/// requester in the same run executes exactly once (diamond dependencies,
/// §5).
#[derive(Default)]
pub struct Memo {
    state: Mutex<MemoState>,
    cv: Condvar,
}

#[derive(Default)]
struct MemoState {
    done: HashMap<String, TaskOutcome>,
    in_progress: HashSet<String>,
}

impl Memo {
    /// Create an empty memo, scoped to one `run`/`multi`/`pipeline` invocation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute `compute()` for `name` exactly once across however many
    /// concurrent callers request it; later callers block until the first
    /// caller finishes, then receive its cached result.
    fn run_or_wait(&self, name: &str, compute: impl FnOnce() -> TaskOutcome) -> TaskOutcome {
        {
            let mut guard = self
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            loop {
                if let Some(outcome) = guard.done.get(name) {
                    return outcome.clone();
                }
                if guard.in_progress.insert(name.to_string()) {
                    break;
                }
                guard = self
                    .cv
                    .wait(guard)
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
            }
        }

        let outcome = compute();

        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.done.insert(name.to_string(), outcome.clone());
        guard.in_progress.remove(name);
        drop(guard);
        self.cv.notify_all();
        outcome
    }
}

/// Resolve `name` (by name or alias) and run it, having first resolved and
/// run its own `depends_on` (dispatched concurrently iff the task's own
/// `parallel` flag is set, per spec.md §4.5). Memoized via `memo` so a
/// dependency shared across the run executes once.
pub fn run_tree(name: &str, ctx: &RunContext, log: &Arc<dyn Log>, top: &Arc<Logger>, memo: &Memo) -> TaskOutcome {
    let Some(task) = ctx.config.find_task(name).cloned() else {
        let message = "task not found".to_string();
        log.record_task(name, crate::logging::TaskStatus::Failed, Some(&message));
        return TaskOutcome::cancelled(name);
    };

    memo.run_or_wait(&task.name.clone(), move || {
        let dep_outcomes = if task.depends_on.is_empty() {
            Vec::new()
        } else {
            dispatch(
                &task.depends_on,
                ctx,
                log,
                top,
                memo,
                task.parallel,
                OnFailure::FailFast,
                OutputMode::Buffered,
            )
        };

        if dep_outcomes.iter().any(TaskOutcome::failed) {
            let reason = "a dependency failed".to_string();
            log.record_task(&task.name, crate::logging::TaskStatus::Skipped, Some(&reason));
            return TaskOutcome {
                name: task.name.clone(),
                status: crate::logging::TaskStatus::Skipped,
                message: Some(reason),
                spawned: false,
            };
        }

        orchestrator::run_task(&task, ctx, log.as_ref(), false)
    })
}

/// Dispatch a flat set of task names, sequentially or concurrently,
/// honoring `on_failure` and (when concurrent) `output` capture mode. The
/// shared primitive behind both a task's own `depends_on` fan-out (C5) and
/// `multi`/pipeline-stage dispatch (C8).
#[allow(clippy::too_many_arguments)]
pub fn dispatch(
    names: &[String],
    ctx: &RunContext,
    log: &Arc<dyn Log>,
    top: &Arc<Logger>,
    memo: &Memo,
    parallel: bool,
    on_failure: OnFailure,
    output: OutputMode,
) -> Vec<TaskOutcome> {
    if !parallel || names.len() <= 1 {
        dispatch_sequential(names, ctx, log, top, memo, on_failure)
    } else {
        dispatch_parallel(names, ctx, top, memo, on_failure, output)
    }
}

fn dispatch_sequential(
    names: &[String],
    ctx: &RunContext,
    log: &Arc<dyn Log>,
    top: &Arc<Logger>,
    memo: &Memo,
    on_failure: OnFailure,
) -> Vec<TaskOutcome> {
    let mut outcomes = Vec::with_capacity(names.len());
    let mut abort = false;
    for name in names {
        if abort || crate::interrupt::is_requested() {
            outcomes.push(TaskOutcome::cancelled(name));
            continue;
        }
        let outcome = run_tree(name, ctx, log, top, memo);
        if on_failure != OnFailure::Continue && outcome.failed() {
            abort = true;
        }
        outcomes.push(outcome);
    }
    outcomes
}

/// Rayon-based parallel task dispatch, mirroring the teacher's
/// `tasks/processing/parallel.rs`. `par_iter().map(...).collect()` preserves
/// input order in the output `Vec` regardless of completion order, so
/// callers can still index outcomes positionally.
fn dispatch_parallel(
    names: &[String],
    ctx: &RunContext,
    top: &Arc<Logger>,
    memo: &Memo,
    on_failure: OnFailure,
    output: OutputMode,
) -> Vec<TaskOutcome> {
    use rayon::prelude::*;
    let cancelled = AtomicBool::new(false);

    names
        .par_iter()
        .map(|name| {
            let should_cancel = crate::interrupt::is_requested()
                || (on_failure != OnFailure::Continue && cancelled.load(Ordering::SeqCst));
            if should_cancel {
                return TaskOutcome::cancelled(name);
            }

            top.notify_task_start(name);
            let outcome = match output {
                OutputMode::Buffered => {
                    let buffered = Arc::new(BufferedLog::new(Arc::clone(top)));
                    let log: Arc<dyn Log> = buffered.clone();
                    let outcome = run_tree(name, ctx, &log, top, memo);
                    buffered.flush_and_complete(name);
                    outcome
                }
                OutputMode::Interleaved => {
                    let log: Arc<dyn Log> = Arc::clone(top) as Arc<dyn Log>;
                    let outcome = run_tree(name, ctx, &log, top, memo);
                    top.finish_task(name);
                    outcome
                }
            };

            if on_failure != OnFailure::Continue && outcome.failed() {
                cancelled.store(true, Ordering::SeqCst);
            }
            outcome
        })
        .collect()
}

/// Run a single named task (and its dependency tree) to completion. Used by
/// the `run`/`exec` commands.
pub fn run_single(name: &str, ctx: &RunContext, log: &Arc<Logger>) -> TaskOutcome {
    let memo = Memo::new();
    let log_dyn: Arc<dyn Log> = Arc::clone(log) as Arc<dyn Log>;
    run_tree(name, ctx, &log_dyn, log, &memo)
}

/// Run a flat list of task names (each with its own dependency tree) as one
/// group, honoring `parallel`/`on_failure`/`output`. Used by the `multi`
/// command.
pub fn run_multi(
    names: &[String],
    ctx: &RunContext,
    log: &Arc<Logger>,
    parallel: bool,
    on_failure: OnFailure,
    output: OutputMode,
) -> Vec<TaskOutcome> {
    let memo = Memo::new();
    let log_dyn: Arc<dyn Log> = Arc::clone(log) as Arc<dyn Log>;
    dispatch(names, ctx, &log_dyn, log, &memo, parallel, on_failure, output)
}

/// Run a pipeline's stages in order, sharing one dependency memo across the
/// whole run. Under `on_failure = FailFast`, a failed stage aborts
/// subsequent stages.
pub fn run_pipeline(pipeline: &PipelineConfig, ctx: &RunContext, log: &Arc<Logger>) -> Vec<TaskOutcome> {
    let memo = Memo::new();
    let log_dyn: Arc<dyn Log> = Arc::clone(log) as Arc<dyn Log>;
    let mut all = Vec::new();

    for stage in &pipeline.stages {
        let outcomes = dispatch(
            &stage.tasks,
            ctx,
            &log_dyn,
            log,
            &memo,
            stage.parallel,
            pipeline.on_failure,
            pipeline.output,
        );
        let stage_failed = outcomes.iter().any(TaskOutcome::failed);
        all.extend(outcomes);
        if stage_failed && pipeline.on_failure == OnFailure::FailFast {
            log.warn("stage failed; aborting subsequent stages (fail-fast)");
            break;
        }
    }

    all
}
