//! Direct console/file logger with parallel-task progress and summary collection.
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Mutex;

use super::types::{Log, TaskEntry, TaskStatus};
use super::utils::{log_file_path, terminal_columns};

/// Implement the display methods of [`Log`] by delegating to inherent methods
/// of the same name on the implementing type.
///
/// `record_task` is excluded because its signature differs from the shared
/// `fn(&self, &str)` pattern.
macro_rules! forward_log_methods {
    ($($method:ident),+ $(,)?) => {
        $(
            fn $method(&self, msg: &str) {
                self.$method(msg);
            }
        )+
    };
}

/// Direct console/file logger with dry-run-free summary collection.
///
/// All messages are always written to a persistent log file at
/// `$XDG_CACHE_HOME/pt/<command>.log`, regardless of the verbose flag.
#[derive(Debug)]
pub struct Logger {
    tasks: Mutex<Vec<TaskEntry>>,
    log_file: Option<PathBuf>,
    /// Serializes console output from parallel task flushes.
    pub(super) flush_lock: Mutex<()>,
    /// Names of tasks currently executing in parallel.
    pub(super) active_tasks: Mutex<Vec<String>>,
    /// Whether a progress line is currently displayed (`0` = no, `1` = yes).
    pub(super) progress_rows: Mutex<u16>,
}

impl Logger {
    /// Create a new logger for the given command name (used for the log
    /// file and displayed in its header).
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
            log_file: log_file_path(command),
            flush_lock: Mutex::new(()),
            active_tasks: Mutex::new(Vec::new()),
            progress_rows: Mutex::new(0),
        }
    }

    /// Return the log file path, if available.
    #[cfg(test)]
    pub const fn log_path(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    /// Return a clone of all recorded task entries (test-only).
    #[cfg(test)]
    pub(crate) fn task_entries(&self) -> Vec<TaskEntry> {
        self.tasks.lock().map_or_else(|_| vec![], |g| g.clone())
    }

    /// Log an error message.
    pub fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    /// Log a warning message.
    pub fn warn(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    /// Log a stage header (major section).
    pub fn stage(&self, msg: &str) {
        tracing::info!(target: "pt::stage", "{msg}");
    }

    /// Log an informational message.
    pub fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    /// Log a debug message (suppressed on console unless verbose; always
    /// written to the log file).
    pub fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    /// Record a task result for the summary.
    pub fn record_task(&self, name: &str, status: TaskStatus, message: Option<&str>) {
        if let Ok(mut guard) = self.tasks.lock() {
            guard.push(TaskEntry {
                name: name.to_string(),
                status,
                message: message.map(String::from),
            });
        }
    }

    /// Return `true` if any recorded task failed or timed out.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failure_count() > 0
    }

    /// Count the number of failed or timed-out tasks.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.tasks.lock().map_or(0, |guard| {
            guard
                .iter()
                .filter(|t| matches!(t.status, TaskStatus::Failed | TaskStatus::Timeout))
                .count()
        })
    }

    /// Print the summary of all recorded tasks.
    pub fn print_summary(&self) {
        let tasks = match self.tasks.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => return,
        };
        if tasks.is_empty() {
            return;
        }

        self.stage("Summary");

        let mut ok = 0u32;
        let mut skipped = 0u32;
        let mut ignored = 0u32;
        let mut failed = 0u32;
        let mut timeout = 0u32;

        for task in &tasks {
            let (icon, color) = match task.status {
                TaskStatus::Ok => {
                    ok += 1;
                    ("✓", "\x1b[32m")
                }
                TaskStatus::Skipped => {
                    skipped += 1;
                    ("·", "\x1b[2m")
                }
                TaskStatus::Ignored => {
                    ignored += 1;
                    ("○", "\x1b[33m")
                }
                TaskStatus::Failed => {
                    failed += 1;
                    ("✗", "\x1b[31m")
                }
                TaskStatus::Timeout => {
                    timeout += 1;
                    ("⏱", "\x1b[31m")
                }
            };

            let suffix = task
                .message
                .as_ref()
                .map_or_else(String::new, |msg| format!(" ({msg})"));

            self.info(&format!("{color}{icon} {}{suffix}\x1b[0m", task.name));
        }

        let total = ok + skipped + ignored + failed + timeout;
        self.info(&format!(
            "{total} tasks: \x1b[32m{ok} ok\x1b[0m, \x1b[2m{skipped} skipped\x1b[0m, \x1b[33m{ignored} ignored\x1b[0m, \x1b[31m{failed} failed\x1b[0m, \x1b[31m{timeout} timed out\x1b[0m"
        ));

        if let Some(path) = &self.log_file {
            self.info(&format!("\x1b[2mlog: {}\x1b[0m", path.display()));
        }
    }

    /// Erase the in-progress status line from the console.
    ///
    /// No-op if no progress line is currently shown. Must be called while
    /// holding `flush_lock`.
    pub(super) fn clear_progress(&self) {
        let mut guard = self
            .progress_rows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if *guard > 0 {
            print!("\r\x1b[K");
            std::io::stdout().flush().ok();
            *guard = 0;
        }
    }

    /// Print an in-progress status line to the console and mark it as shown.
    ///
    /// The task-name list is truncated to fit within a single terminal row
    /// so that [`clear_progress`](Self::clear_progress) never needs
    /// cursor-up movement.
    ///
    /// Must be called while holding `flush_lock`.
    pub(super) fn draw_progress(&self, names: &str) {
        let cols = terminal_columns();
        let prefix_width = 4;
        let max_name_chars = cols.saturating_sub(prefix_width);
        let display_names = if names.chars().count() > max_name_chars {
            let truncated: String = names
                .chars()
                .take(max_name_chars.saturating_sub(1))
                .collect();
            format!("{truncated}…")
        } else {
            names.to_string()
        };
        print!("  \x1b[2m▹ {display_names}\x1b[0m");
        std::io::stdout().flush().ok();
        let mut guard = self
            .progress_rows
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = 1;
    }

    /// Remove `name` from the active-task set and redraw the progress line.
    ///
    /// Used when a task's output was written directly (interleaved mode)
    /// rather than through a [`super::BufferedLog`], so there is nothing to
    /// replay -- only the progress display needs updating.
    pub fn finish_task(&self, name: &str) {
        let _guard = self
            .flush_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.clear_progress();
        let remaining = self.active_tasks.lock().ok().and_then(|mut active| {
            active.retain(|n| n != name);
            (!active.is_empty()).then(|| active.join(", "))
        });
        if let Some(names) = remaining {
            self.draw_progress(&names);
        }
    }

    /// Record that a parallel task has started.
    pub fn notify_task_start(&self, name: &str) {
        let _guard = self
            .flush_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.clear_progress();
        let names = self.active_tasks.lock().map_or_else(
            |_| name.to_string(),
            |mut active| {
                active.push(name.to_string());
                active.join(", ")
            },
        );
        self.draw_progress(&names);
    }
}

impl Log for Logger {
    forward_log_methods!(stage, info, debug, warn, error);

    fn record_task(&self, name: &str, status: TaskStatus, message: Option<&str>) {
        self.record_task(name, status, message);
    }
}
