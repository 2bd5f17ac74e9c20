//! Shared, immutable per-invocation state threaded through the engine.
use std::sync::Arc;

use crate::config::EffectiveConfig;
use crate::exec::Executor;
use crate::platform::Platform;

/// Name of the isolated-runner tool invoked for `script`/dependency-bearing
/// `cmd` tasks, unless overridden by `PT_RUNNER`.
pub const DEFAULT_RUNNER_TOOL: &str = "uv";

/// Immutable state shared across every task dispatched during one run.
///
/// Built once by the command layer after configuration resolution; never
/// mutated afterward (§5, "Shared resources").
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Fully resolved configuration for this invocation.
    pub config: Arc<EffectiveConfig>,
    /// Detected (or overridden, for tests) platform.
    pub platform: Arc<Platform>,
    /// Subprocess execution backend.
    pub executor: Arc<dyn Executor>,
    /// Name of the isolated-runner tool (C6's `<tool>`).
    pub runner_tool: String,
}

impl RunContext {
    /// Build a context with the default runner tool name, honoring
    /// `PT_RUNNER` if set.
    #[must_use]
    pub fn new(config: Arc<EffectiveConfig>, platform: Arc<Platform>, executor: Arc<dyn Executor>) -> Self {
        let runner_tool = std::env::var("PT_RUNNER").unwrap_or_else(|_| DEFAULT_RUNNER_TOOL.to_string());
        Self {
            config,
            platform,
            executor,
            runner_tool,
        }
    }
}
