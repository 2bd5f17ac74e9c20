//! Config discovery, inheritance resolution, and profile overlay (C4).
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, GraphError, PtError};
use crate::platform::Platform;

use super::env_file;
use super::schema::{
    Condition, Hooks, OnFailure, OutputMode, PipelineConfig, ProjectConfig, PyProjectTool,
    RawConfig, StageConfig, TaskConfig, validate_python_version, validate_tag, validate_task_name,
};

/// Filename tried first at each directory level during discovery.
const CONFIG_FILENAME: &str = "pt.toml";
/// Fallback filename; only used if it carries a `[tool.pt]` table.
const PYPROJECT_FILENAME: &str = "pyproject.toml";

/// Exactly one of `script` or `cmd`, resolved after inheritance (I3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    /// Path to a source file to run via the isolated runner.
    Script(String),
    /// Shell command string to run.
    Cmd(String),
}

/// A task after inheritance resolution and profile overlay.
///
/// Carries no `extend` field; every optional invariant-bearing field has
/// been validated and defaulted.
#[derive(Debug, Clone)]
pub struct EffectiveTask {
    /// Canonical task name.
    pub name: String,
    /// Exactly one of script or cmd (I3).
    pub kind: TaskKind,
    /// Arguments appended to the invocation, parent-first.
    pub args: Vec<String>,
    /// Package specifiers, with dependency-group names already expanded.
    pub dependencies: Vec<String>,
    /// Fully layered environment variables (task > profile > global > built-ins).
    pub env: HashMap<String, String>,
    /// Directories prepended to `PYTHONPATH`, deduplicated preserving order.
    pub pythonpath: Vec<String>,
    /// Names of tasks this one depends on.
    pub depends_on: Vec<String>,
    /// Whether `depends_on` tasks may run concurrently.
    pub parallel: bool,
    /// Effective interpreter version: task > profile > project > unset.
    pub python: Option<String>,
    /// Working directory for the subprocess.
    pub cwd: Option<String>,
    /// Timeout in seconds; `> 0` if set (I7).
    pub timeout: Option<u64>,
    /// Non-zero exit does not fail the run or invoke the error handler.
    pub ignore_errors: bool,
    /// Declarative gating condition.
    pub condition: Option<Condition>,
    /// Path to a script whose exit code gates the task.
    pub condition_script: Option<String>,
    /// Alternative names, deduplicated preserving first occurrence.
    pub aliases: Vec<String>,
    /// Tag strings, unioned and sorted lexicographically.
    pub tags: Vec<String>,
    /// Single category tag.
    pub category: Option<String>,
    /// Auxiliary hook scripts.
    pub hooks: Hooks,
    /// Free-form description.
    pub description: String,
    /// True iff the name starts with `_`.
    pub private: bool,
}

/// Fully resolved configuration for one invocation of the runner.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    /// Directory containing the discovered config file.
    pub root: PathBuf,
    /// Path to the discovered config file itself.
    pub config_file: PathBuf,
    /// Project-wide settings.
    pub project: ProjectConfig,
    /// Name of the profile used to resolve this config, if any.
    pub profile_name: Option<String>,
    /// Effective tasks, keyed by canonical name.
    pub tasks: HashMap<String, EffectiveTask>,
    /// Alias → canonical name, for CLI task lookup.
    pub aliases: HashMap<String, String>,
    /// Pipeline definitions, keyed by name.
    pub pipelines: HashMap<String, PipelineConfig>,
}

impl EffectiveConfig {
    /// Resolve `name_or_alias` to a canonical task, if it exists.
    #[must_use]
    pub fn find_task(&self, name_or_alias: &str) -> Option<&EffectiveTask> {
        if let Some(task) = self.tasks.get(name_or_alias) {
            return Some(task);
        }
        let canonical = self.aliases.get(name_or_alias)?;
        self.tasks.get(canonical)
    }
}

/// Discover the project's config file by walking upward from `start`.
///
/// # Errors
///
/// Returns [`ConfigError::NotFound`] if neither `pt.toml` nor a
/// `pyproject.toml` with a `[tool.pt]` table is found before reaching the
/// filesystem root.
pub fn discover(start: &Path) -> Result<PathBuf, ConfigError> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILENAME);
        if candidate.is_file() {
            return Ok(candidate);
        }
        let pyproject = dir.join(PYPROJECT_FILENAME);
        if pyproject.is_file() && has_tool_pt_table(&pyproject) {
            return Ok(pyproject);
        }
        if !dir.pop() {
            return Err(ConfigError::NotFound(start.display().to_string()));
        }
    }
}

/// Cheap pre-check: does this `pyproject.toml` have a `[tool.pt]` table?
/// Avoids strict-mode deserialization failing on unrelated `[tool.*]` tables.
fn has_tool_pt_table(path: &Path) -> bool {
    let Ok(content) = std::fs::read_to_string(path) else {
        return false;
    };
    let Ok(value) = content.parse::<toml::Value>() else {
        return false;
    };
    value
        .get("tool")
        .and_then(|t| t.get("pt"))
        .is_some()
}

/// Parse a discovered config file into its [`RawConfig`].
fn parse_raw_config(path: &Path) -> Result<RawConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    if path.file_name().and_then(|n| n.to_str()) == Some(PYPROJECT_FILENAME) {
        let wrapper: PyProjectTool = toml::from_str(&content)
            .map_err(|e| invalid_toml_error(path, &e))?;
        return Ok(wrapper.tool.pt);
    }

    toml::from_str(&content).map_err(|e| invalid_toml_error(path, &e))
}

/// Build a [`ConfigError`] from a TOML deserialization failure, extracting
/// the offending field name when the failure is an unknown-field rejection.
fn invalid_toml_error(path: &Path, e: &toml::de::Error) -> ConfigError {
    let message = e.message();
    if let Some(field) = message
        .strip_prefix("unknown field `")
        .and_then(|rest| rest.split('`').next())
    {
        return ConfigError::UnknownField {
            field: field.to_string(),
            context: path.display().to_string(),
        };
    }
    ConfigError::InvalidToml {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

/// Merge a chain of task configs (root ancestor first, the task itself
/// last) per the field-specific rules in §4.4.
fn merge_chain(chain: &[&TaskConfig]) -> TaskConfig {
    let mut merged = TaskConfig::default();
    let mut dep_seen = HashSet::new();
    let mut pp_seen = HashSet::new();
    let mut dep_on_seen = HashSet::new();
    let mut tag_seen = HashSet::new();
    let mut alias_seen = HashSet::new();

    for cfg in chain {
        if cfg.script.is_some() {
            merged.script = cfg.script.clone();
        }
        if cfg.cmd.is_some() {
            merged.cmd = cfg.cmd.clone();
        }
        if cfg.cwd.is_some() {
            merged.cwd = cfg.cwd.clone();
        }
        if cfg.timeout.is_some() {
            merged.timeout = cfg.timeout;
        }
        if cfg.python.is_some() {
            merged.python = cfg.python.clone();
        }
        if cfg.description.is_some() {
            merged.description = cfg.description.clone();
        }
        if cfg.category.is_some() {
            merged.category = cfg.category.clone();
        }
        if cfg.ignore_errors.is_some() {
            merged.ignore_errors = cfg.ignore_errors;
        }
        if cfg.parallel.is_some() {
            merged.parallel = cfg.parallel;
        }
        if cfg.condition.is_some() {
            merged.condition = cfg.condition.clone();
        }
        if cfg.condition_script.is_some() {
            merged.condition_script = cfg.condition_script.clone();
        }
        if cfg.hooks.before_task.is_some() {
            merged.hooks.before_task = cfg.hooks.before_task.clone();
        }
        if cfg.hooks.after_success.is_some() {
            merged.hooks.after_success = cfg.hooks.after_success.clone();
        }
        if cfg.hooks.after_failure.is_some() {
            merged.hooks.after_failure = cfg.hooks.after_failure.clone();
        }
        if cfg.hooks.after_task.is_some() {
            merged.hooks.after_task = cfg.hooks.after_task.clone();
        }

        for dep in &cfg.dependencies {
            if dep_seen.insert(dep.clone()) {
                merged.dependencies.push(dep.clone());
            }
        }
        for p in &cfg.pythonpath {
            if pp_seen.insert(p.clone()) {
                merged.pythonpath.push(p.clone());
            }
        }
        for d in &cfg.depends_on {
            if dep_on_seen.insert(d.clone()) {
                merged.depends_on.push(d.clone());
            }
        }
        for t in &cfg.tags {
            if tag_seen.insert(t.clone()) {
                merged.tags.push(t.clone());
            }
        }
        for a in &cfg.aliases {
            if alias_seen.insert(a.clone()) {
                merged.aliases.push(a.clone());
            }
        }

        merged.args.extend(cfg.args.iter().cloned());

        for (k, v) in &cfg.env {
            merged.env.insert(k.clone(), v.clone());
        }
    }

    merged.tags.sort();
    merged
}

/// Walk `name`'s `extend` chain from root ancestor to `name` itself,
/// rejecting cycles.
///
/// # Errors
///
/// Returns [`GraphError::ExtendCycle`] naming all cycle members, or
/// [`GraphError::TaskNotFound`] if an `extend` target does not exist.
fn build_chain<'a>(
    name: &str,
    tasks: &'a HashMap<String, TaskConfig>,
) -> Result<Vec<&'a TaskConfig>, GraphError> {
    let mut chain = Vec::new();
    let mut visited = Vec::new();
    let mut current = name.to_string();
    loop {
        if visited.contains(&current) {
            visited.push(current);
            return Err(GraphError::ExtendCycle(visited.join(" -> ")));
        }
        visited.push(current.clone());
        let Some(cfg) = tasks.get(&current) else {
            return Err(GraphError::TaskNotFound(current));
        };
        chain.push(cfg);
        match &cfg.extend {
            Some(parent) => current = parent.clone(),
            None => break,
        }
    }
    chain.reverse();
    Ok(chain)
}

/// Overlay `env` on top of `base`, later keys winning.
fn overlay(base: &mut HashMap<String, String>, overlay: HashMap<String, String>) {
    base.extend(overlay);
}

/// Inject a built-in variable only if not already set by the user (lowest priority).
fn inject_default(env: &mut HashMap<String, String>, key: &str, value: String) {
    env.entry(key.to_string()).or_insert(value);
}

/// Expand dependency-group references in `entries` against `groups`.
///
/// An entry is treated as a group name if it's a key in `groups`; otherwise
/// it is kept as a literal package specifier. Per the resolved "open
/// question" on naming collisions, group names win over same-named package
/// specifiers.
fn expand_dependencies(entries: &[String], groups: &HashMap<String, Vec<String>>) -> Vec<String> {
    entries
        .iter()
        .flat_map(|entry| {
            groups
                .get(entry)
                .cloned()
                .unwrap_or_else(|| vec![entry.clone()])
        })
        .collect()
}

/// Deduplicate `items`, preserving first occurrence.
fn dedup_preserve_order(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|i| seen.insert(i.clone())).collect()
}

/// Load and fully resolve the config reachable from `start`.
///
/// `profile_override` takes priority over `PT_PROFILE` and the project's
/// `default_profile`, per §4.4.
///
/// # Errors
///
/// Returns a [`PtError`] if the config file cannot be found, parsed, or if
/// any invariant (I1-I7) is violated.
pub fn load(
    start: &Path,
    profile_override: Option<&str>,
    platform: &Platform,
) -> Result<EffectiveConfig, PtError> {
    let config_file = discover(start)?;
    load_file(&config_file, profile_override, platform)
}

/// Load and fully resolve a config file whose path is already known (e.g.
/// from `--config`), skipping upward discovery.
///
/// # Errors
///
/// Returns a [`PtError`] if the config file cannot be parsed, or if any
/// invariant (I1-I7) is violated.
pub fn load_file(
    config_file: &Path,
    profile_override: Option<&str>,
    platform: &Platform,
) -> Result<EffectiveConfig, PtError> {
    let config_file = config_file.to_path_buf();
    let root = config_file
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let raw = parse_raw_config(&config_file)?;

    let profile_name = profile_override
        .map(str::to_string)
        .or_else(|| std::env::var("PT_PROFILE").ok())
        .or_else(|| raw.project.default_profile.clone());

    let profile = profile_name.as_ref().and_then(|n| raw.profiles.get(n));
    if let (Some(name), None) = (&profile_name, profile) {
        return Err(ConfigError::InvariantViolation(format!(
            "profile '{name}' is not defined"
        ))
        .into());
    }

    // Effective dependency-group map: global overlaid by profile's groups.
    let mut dependency_groups = raw.dependencies.clone();
    if let Some(p) = profile {
        for (k, v) in &p.dependencies {
            dependency_groups.insert(k.clone(), v.clone());
        }
    }

    // Global env layer: project.env_files (in order) then [env] overlay.
    let mut global_env = HashMap::new();
    for file in &raw.project.env_files {
        overlay(&mut global_env, env_file::parse_file(&root.join(file))?);
    }
    overlay(&mut global_env, raw.env.clone());

    // Profile env layer: profile.env_files then profile.env overlay.
    let mut profile_env = HashMap::new();
    if let Some(p) = profile {
        for file in &p.env_files {
            overlay(&mut profile_env, env_file::parse_file(&root.join(file))?);
        }
        overlay(&mut profile_env, p.env.clone());
    }

    let profile_python = profile.and_then(|p| p.python.clone());

    let mut effective_tasks = HashMap::new();
    let mut aliases: HashMap<String, String> = HashMap::new();
    let mut all_names: HashSet<String> = HashSet::new();

    for name in raw.tasks.keys() {
        validate_task_name(name, &format!("tasks.{name}"))?;
        let chain = build_chain(name, &raw.tasks)?;
        let merged = merge_chain(&chain);

        let kind = match (&merged.script, &merged.cmd) {
            (Some(s), None) => TaskKind::Script(s.clone()),
            (None, Some(c)) => TaskKind::Cmd(c.clone()),
            (None, None) => {
                return Err(ConfigError::InvariantViolation(format!(
                    "task '{name}': must set exactly one of script or cmd"
                ))
                .into());
            }
            (Some(_), Some(_)) => {
                return Err(ConfigError::InvariantViolation(format!(
                    "task '{name}': cannot set both script and cmd"
                ))
                .into());
            }
        };

        for tag in &merged.tags {
            validate_tag(tag, &format!("tasks.{name}.tags"))?;
        }
        if let Some(cat) = &merged.category {
            validate_tag(cat, &format!("tasks.{name}.category"))?;
        }
        for alias in &merged.aliases {
            validate_task_name(alias, &format!("tasks.{name}.aliases"))?;
        }
        if let Some(timeout) = merged.timeout
            && timeout == 0
        {
            return Err(ConfigError::InvariantViolation(format!(
                "task '{name}': timeout must be > 0"
            ))
            .into());
        }
        let python = merged
            .python
            .clone()
            .or_else(|| profile_python.clone())
            .or_else(|| raw.project.python.clone());
        if let Some(p) = &python {
            validate_python_version(p, &format!("tasks.{name}.python"))?;
        }

        let mut env = global_env.clone();
        overlay(&mut env, profile_env.clone());
        overlay(&mut env, merged.env.clone());

        let dependencies = expand_dependencies(&merged.dependencies, &dependency_groups);
        let pythonpath = dedup_preserve_order(merged.pythonpath.clone());

        if !all_names.insert(name.clone()) {
            return Err(
                ConfigError::InvariantViolation(format!("duplicate task name '{name}'")).into(),
            );
        }
        for alias in &merged.aliases {
            if !all_names.insert(alias.clone()) {
                return Err(ConfigError::InvariantViolation(format!(
                    "alias '{alias}' collides with another task or alias name"
                ))
                .into());
            }
            aliases.insert(alias.clone(), name.clone());
        }

        effective_tasks.insert(
            name.clone(),
            EffectiveTask {
                name: name.clone(),
                kind,
                args: merged.args,
                dependencies,
                env,
                pythonpath,
                depends_on: merged.depends_on,
                parallel: merged.parallel.unwrap_or(false),
                python,
                cwd: merged.cwd,
                timeout: merged.timeout,
                ignore_errors: merged.ignore_errors.unwrap_or(false),
                condition: merged.condition,
                condition_script: merged.condition_script,
                aliases: merged.aliases,
                tags: merged.tags,
                category: merged.category,
                hooks: merged.hooks,
                description: merged.description.unwrap_or_default(),
                private: TaskConfig::is_private(name),
            },
        );
    }

    // I4: every depends_on target must exist (by name or alias).
    for task in effective_tasks.values() {
        for dep in &task.depends_on {
            let resolved = effective_tasks.contains_key(dep) || aliases.contains_key(dep);
            if !resolved {
                return Err(GraphError::TaskNotFound(dep.clone()).into());
            }
        }
    }

    // I6: on_error_task must name an existing task.
    if let Some(handler) = &raw.project.on_error_task
        && !effective_tasks.contains_key(handler)
        && !aliases.contains_key(handler)
    {
        return Err(GraphError::TaskNotFound(handler.clone()).into());
    }

    // Built-ins, lowest priority: inject into every task's env if not already set.
    let tags_csv = {
        let mut all_tags: Vec<String> = effective_tasks
            .values()
            .flat_map(|t| t.tags.clone())
            .collect();
        all_tags.sort();
        all_tags.dedup();
        all_tags.join(",")
    };
    for task in effective_tasks.values_mut() {
        inject_default(&mut task.env, "PT_TASK_NAME", task.name.clone());
        inject_default(
            &mut task.env,
            "PT_PROJECT_ROOT",
            root.display().to_string(),
        );
        inject_default(
            &mut task.env,
            "PT_CONFIG_FILE",
            config_file.display().to_string(),
        );
        inject_default(
            &mut task.env,
            "PT_PROFILE",
            profile_name.clone().unwrap_or_default(),
        );
        if let Some(python) = &task.python {
            inject_default(&mut task.env, "PT_PYTHON_VERSION", python.clone());
        }
        if let Some(category) = &task.category {
            inject_default(&mut task.env, "PT_CATEGORY", category.clone());
        }
        inject_default(&mut task.env, "PT_TAGS", tags_csv.clone());
        inject_default(
            &mut task.env,
            "PT_CI",
            platform.is_ci().to_string(),
        );
        if let Some(branch) = Platform::git_branch(&root) {
            inject_default(&mut task.env, "PT_GIT_BRANCH", branch);
        }
        if let Some(commit) = Platform::git_commit(&root) {
            inject_default(&mut task.env, "PT_GIT_COMMIT", commit);
        }
    }

    let result = EffectiveConfig {
        root,
        config_file,
        project: raw.project,
        profile_name,
        tasks: effective_tasks,
        aliases,
        pipelines: raw.pipelines,
    };

    // I4 (cont'd): the depends_on graph must be acyclic, not just resolvable.
    crate::tasks::graph::check_acyclic(&result)?;

    Ok(result)
}

/// Fixtures shared by this module's tests and by other modules' tests
/// that need an `EffectiveConfig`/`EffectiveTask` without exercising the
/// full discovery-and-merge pipeline.
#[cfg(test)]
pub(crate) mod test_helpers {
    use super::{EffectiveConfig, EffectiveTask, HashMap, PathBuf, TaskKind};
    use crate::config::schema::Hooks;

    pub(crate) fn minimal_task(name: &str) -> EffectiveTask {
        EffectiveTask {
            name: name.to_string(),
            kind: TaskKind::Cmd("true".to_string()),
            args: Vec::new(),
            dependencies: Vec::new(),
            env: HashMap::new(),
            pythonpath: Vec::new(),
            depends_on: Vec::new(),
            parallel: false,
            python: None,
            cwd: None,
            timeout: None,
            ignore_errors: false,
            condition: None,
            condition_script: None,
            aliases: Vec::new(),
            tags: Vec::new(),
            category: None,
            hooks: Hooks::default(),
            description: String::new(),
            private: false,
        }
    }

    pub(crate) fn empty_effective_config(root: PathBuf) -> EffectiveConfig {
        EffectiveConfig {
            config_file: root.join("pt.toml"),
            root,
            project: crate::config::schema::ProjectConfig::default(),
            profile_name: None,
            tasks: HashMap::new(),
            aliases: HashMap::new(),
            pipelines: HashMap::new(),
        }
    }
}
