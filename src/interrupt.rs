//! Process-wide interruption flag set by the `SIGINT` handler in `main`.
//!
//! Mirrors the teacher's `ctrlc::set_handler` + `AtomicBool` pattern: the
//! handler only flips a flag, and the scheduler's dispatch loops poll it
//! between tasks so that no new task starts once a `Ctrl-C` has landed.
//! In-flight subprocesses are not killed directly -- `SystemExecutor`'s
//! `Command` children share the terminal's process group and receive the
//! same signal.
use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Mark the process as interrupted. Called from the `ctrlc` handler.
pub fn request() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Whether an interruption has been requested.
#[must_use]
pub fn is_requested() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}
