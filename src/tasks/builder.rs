//! Translates an effective task into a subprocess invocation (C6).
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::config::inline_metadata;
use crate::config::loader::TaskKind;
use crate::config::EffectiveTask;
use crate::error::{ConfigError, PtError};
use crate::exec::Invocation;

use super::context::RunContext;

/// Resolve `p` against `root` if it is relative.
pub(crate) fn resolve_path(root: &Path, p: &str) -> PathBuf {
    let path = Path::new(p);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Strip a PEP 508 version/extras specifier, leaving the bare package name.
fn package_name(spec: &str) -> &str {
    const SEPS: [char; 6] = ['=', '>', '<', '!', '~', '['];
    spec.find(SEPS).map_or(spec, |i| spec[..i].trim())
}

/// Merge a script's inline-metadata dependencies into the task's own list.
///
/// The task's explicit `dependencies` win on package-name conflicts (spec
/// §4.6); inline entries are appended only when no task dependency already
/// names the same package.
fn merge_dependencies(task_deps: &[String], inline_deps: &[String]) -> Vec<String> {
    let claimed: HashSet<&str> = task_deps.iter().map(|d| package_name(d)).collect();
    let mut merged = task_deps.to_vec();
    for dep in inline_deps {
        if !claimed.contains(package_name(dep)) {
            merged.push(dep.clone());
        }
    }
    merged
}

#[cfg(unix)]
fn shell_invocation() -> (&'static str, &'static str) {
    ("bash", "-c")
}

#[cfg(windows)]
fn shell_invocation() -> (&'static str, &'static str) {
    ("cmd", "/C")
}

/// Quote `s` for inclusion in a POSIX shell command line if it contains
/// anything beyond a conservative set of "obviously safe" characters.
fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:@%".contains(c))
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

/// Join `cmd` with `args`, each argument shell-quoted.
fn join_shell(cmd: &str, args: &[String]) -> String {
    let mut out = cmd.to_string();
    for arg in args {
        out.push(' ');
        out.push_str(&shell_quote(arg));
    }
    out
}

/// Prepend `pythonpath` entries to the inherited `PYTHONPATH`, deduplicated
/// preserving order, using the platform's path-list separator.
pub(crate) fn apply_pythonpath(env: &mut HashMap<String, String>, pythonpath: &[String]) {
    if pythonpath.is_empty() {
        return;
    }
    let sep = if cfg!(windows) { ';' } else { ':' };
    let existing = env.get("PYTHONPATH").cloned().unwrap_or_default();
    let mut parts: Vec<String> = Vec::with_capacity(pythonpath.len());
    let mut seen: HashSet<String> = HashSet::new();
    for part in pythonpath {
        if seen.insert(part.clone()) {
            parts.push(part.clone());
        }
    }
    for part in existing.split(sep) {
        if !part.is_empty() && seen.insert(part.to_string()) {
            parts.push(part.to_string());
        }
    }
    env.insert("PYTHONPATH".to_string(), parts.join(&sep.to_string()));
}

/// Build an isolated-runner argument vector: `run [--with <dep>]...
/// [--python <ver>] <target> [args...]`, where `target` is either a script
/// path or `-- <shell> <flag> <command>` for a dependency-bearing `cmd`.
fn runner_args(dependencies: &[String], python: Option<&str>) -> Vec<String> {
    let mut args = vec!["run".to_string()];
    for dep in dependencies {
        args.push("--with".to_string());
        args.push(dep.clone());
    }
    if let Some(p) = python {
        args.push("--python".to_string());
        args.push(p.to_string());
    }
    args
}

/// Build the subprocess [`Invocation`] for `task` (C6).
///
/// # Errors
///
/// Returns an error if a `script` task's source file cannot be read or its
/// inline metadata block is malformed.
pub fn build(task: &EffectiveTask, ctx: &RunContext) -> Result<Invocation, PtError> {
    let cwd = task
        .cwd
        .as_deref()
        .map(|c| resolve_path(&ctx.config.root, c));
    let mut env = task.env.clone();
    apply_pythonpath(&mut env, &task.pythonpath);

    let (program, args) = match &task.kind {
        TaskKind::Script(path) => build_script(task, ctx, path)?,
        TaskKind::Cmd(cmd) => build_cmd(task, ctx, cmd),
    };

    Ok(Invocation {
        program,
        args,
        env,
        cwd,
        timeout: task.timeout,
    })
}

fn build_script(
    task: &EffectiveTask,
    ctx: &RunContext,
    path: &str,
) -> Result<(String, Vec<String>), PtError> {
    let script_path = resolve_path(&ctx.config.root, path);
    let source = std::fs::read_to_string(&script_path).map_err(|source| ConfigError::Io {
        path: script_path.display().to_string(),
        source,
    })?;
    let inline = inline_metadata::parse(&source)?;
    let dependencies = merge_dependencies(&task.dependencies, &inline.dependencies);
    let python = task.python.as_deref().or(inline.requires_python.as_deref());

    let mut args = runner_args(&dependencies, python);
    args.push(script_path.display().to_string());
    args.extend(task.args.iter().cloned());
    Ok((ctx.runner_tool.clone(), args))
}

fn build_cmd(task: &EffectiveTask, ctx: &RunContext, cmd: &str) -> (String, Vec<String>) {
    let full_command = join_shell(cmd, &task.args);
    if task.dependencies.is_empty() {
        let (shell, flag) = shell_invocation();
        return (shell.to_string(), vec![flag.to_string(), full_command]);
    }

    let mut args = runner_args(&task.dependencies, task.python.as_deref());
    let (shell, flag) = shell_invocation();
    args.push("--".to_string());
    args.push(shell.to_string());
    args.push(flag.to_string());
    args.push(full_command);
    (ctx.runner_tool.clone(), args)
}
