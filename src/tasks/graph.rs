//! Dependency-graph cycle detection (C5).
//!
//! `scheduler.rs`'s recursive, `Memo`-gated `run_tree`/`dispatch` is the
//! sole C5 dispatch mechanism: it walks and fans out a task's `depends_on`
//! directly rather than precomputing topological layers, so this module's
//! job ends at proving the graph is acyclic.
use std::collections::HashMap;

use crate::config::EffectiveConfig;
use crate::error::GraphError;

/// Resolve `name_or_alias` to a canonical task name, if it exists.
fn canonicalize<'a>(config: &'a EffectiveConfig, name: &'a str) -> Option<&'a str> {
    if config.tasks.contains_key(name) {
        return Some(name);
    }
    config.aliases.get(name).map(String::as_str)
}

/// Walk `depends_on` from every task, reporting the first cycle found via
/// depth-first search with an explicit recursion stack.
///
/// Called by [`crate::config::loader::load`] to close invariant I4's
/// cycle-freedom requirement; `depends_on` target *existence* is already
/// validated there.
pub fn check_acyclic(config: &EffectiveConfig) -> Result<(), GraphError> {
    let mut state: HashMap<&str, VisitState> = HashMap::new();

    let mut names: Vec<&str> = config.tasks.keys().map(String::as_str).collect();
    names.sort_unstable();

    for name in names {
        if matches!(state.get(name), Some(VisitState::Done)) {
            continue;
        }
        let mut stack = Vec::new();
        visit(config, name, &mut state, &mut stack)?;
    }

    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Visiting,
    Done,
}

fn visit<'a>(
    config: &'a EffectiveConfig,
    name: &'a str,
    state: &mut HashMap<&'a str, VisitState>,
    stack: &mut Vec<&'a str>,
) -> Result<(), GraphError> {
    if let Some(pos) = stack.iter().position(|n| *n == name) {
        let mut cycle: Vec<String> = stack[pos..].iter().map(ToString::to_string).collect();
        cycle.push(name.to_string());
        return Err(GraphError::DependencyCycle(cycle.join(" -> ")));
    }
    if matches!(state.get(name), Some(VisitState::Done)) {
        return Ok(());
    }

    stack.push(name);
    state.insert(name, VisitState::Visiting);

    if let Some(task) = config.tasks.get(name) {
        for dep in &task.depends_on {
            let canonical = canonicalize(config, dep).unwrap_or(dep.as_str());
            visit(config, canonical, state, stack)?;
        }
    }

    stack.pop();
    state.insert(name, VisitState::Done);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::loader::test_helpers::{empty_effective_config, minimal_task};

    fn config_with(tasks: Vec<(&str, Vec<&str>)>) -> EffectiveConfig {
        let mut config = empty_effective_config(std::env::temp_dir());
        for (name, deps) in tasks {
            let mut t = minimal_task(name);
            t.depends_on = deps.into_iter().map(ToString::to_string).collect();
            config.tasks.insert(name.to_string(), t);
        }
        config
    }

    #[test]
    fn acyclic_graph_passes() {
        let config = config_with(vec![("a", vec!["b"]), ("b", vec![])]);
        assert!(check_acyclic(&config).is_ok());
    }

    #[test]
    fn direct_cycle_is_rejected() {
        let config = config_with(vec![("a", vec!["b"]), ("b", vec!["a"])]);
        let err = check_acyclic(&config).unwrap_err();
        assert!(matches!(err, GraphError::DependencyCycle(_)));
    }

    #[test]
    fn self_dependency_is_rejected() {
        let config = config_with(vec![("a", vec!["a"])]);
        assert!(check_acyclic(&config).is_err());
    }

    #[test]
    fn indirect_cycle_is_rejected() {
        let config = config_with(vec![("a", vec!["b"]), ("b", vec!["c"]), ("c", vec!["a"])]);
        assert!(check_acyclic(&config).is_err());
    }
}
