//! Command-line argument definitions for the `pt` binary (A3).
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum, builder::PossibleValue};

use crate::config::{OnFailure, OutputMode};

#[derive(Parser, Debug)]
#[command(
    name = "pt",
    about = "Declarative task runner with profile-aware dependency environments",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(Parser, Debug, Clone)]
pub struct GlobalOpts {
    /// Profile to resolve the configuration with
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Use this config file instead of discovering one from the current directory
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a named task and its dependency tree
    Run(RunOpts),
    /// Run a standalone script file via the isolated runner
    Exec(ExecOpts),
    /// Run a flat list of tasks as one group
    Multi(MultiOpts),
    /// Run a named pipeline's stages in order
    Pipeline(PipelineOpts),
    /// Re-run a task whenever matching files change
    Watch(WatchOpts),
    /// List resolved task names
    List(ListOpts),
    /// Print the set of distinct tags across all tasks
    Tags,
    /// Load and validate configuration without executing anything
    Check,
    /// Scaffold a minimal pt.toml in the current directory
    Init(InitOpts),
}

#[derive(Parser, Debug, Clone)]
pub struct RunOpts {
    /// Task name or alias
    pub task: String,

    /// Extra arguments appended to the task's own invocation
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct ExecOpts {
    /// Path to the script to run
    pub script: PathBuf,

    /// Extra arguments passed to the script
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct MultiOpts {
    /// Task names or aliases to run; if empty, selected via --tag/--category
    pub tasks: Vec<String>,

    /// Dispatch the tasks concurrently
    #[arg(long, conflicts_with = "sequential")]
    pub parallel: bool,

    /// Dispatch the tasks one at a time (default)
    #[arg(long, conflicts_with = "parallel")]
    pub sequential: bool,

    /// Failure-handling mode across the group
    #[arg(long, value_enum, default_value_t = OnFailure::FailFast)]
    pub on_failure: OnFailure,

    /// Output-capture mode when dispatched concurrently
    #[arg(long, value_enum, default_value_t = OutputMode::Buffered)]
    pub output: OutputMode,

    /// Select tasks carrying this tag (repeatable); used when no task names are given
    #[arg(long = "tag")]
    pub tag: Vec<String>,

    /// Select tasks matching any listed tag, rather than all of them
    #[arg(long)]
    pub match_any: bool,

    /// Select tasks in this category
    #[arg(long)]
    pub category: Option<String>,
}

impl MultiOpts {
    /// Whether `--parallel`/`--sequential`/neither resolves to concurrent dispatch.
    #[must_use]
    pub const fn parallel_requested(&self) -> bool {
        self.parallel
    }
}

#[derive(Parser, Debug, Clone)]
pub struct PipelineOpts {
    /// Name of the pipeline to run
    pub name: String,
}

#[derive(Parser, Debug, Clone)]
pub struct WatchOpts {
    /// Task name or alias to re-run on change
    pub task: String,

    /// Glob patterns to watch, relative to the project root (default: everything)
    #[arg(long = "pattern")]
    pub pattern: Vec<String>,

    /// Glob patterns to ignore, relative to the project root
    #[arg(long = "ignore")]
    pub ignore: Vec<String>,

    /// Debounce window in seconds before re-running after a change settles
    #[arg(long, default_value_t = 1)]
    pub debounce: u64,

    /// Don't clear the screen between runs
    #[arg(long)]
    pub no_clear: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct ListOpts {
    /// Include private tasks (leading underscore)
    #[arg(long)]
    pub all: bool,

    /// Show description and dependency info for each task
    #[arg(long)]
    pub verbose: bool,

    /// Only list tasks carrying this tag (repeatable)
    #[arg(long = "tag")]
    pub tag: Vec<String>,

    /// Match any listed tag, rather than all of them
    #[arg(long)]
    pub match_any: bool,

    /// Only list tasks in this category
    #[arg(long)]
    pub category: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct InitOpts {
    /// Overwrite an existing pt.toml
    #[arg(long)]
    pub force: bool,
}

impl ValueEnum for OnFailure {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::FailFast, Self::Wait, Self::Continue]
    }

    fn to_possible_value(&self) -> Option<PossibleValue> {
        Some(match self {
            Self::FailFast => PossibleValue::new("fail-fast"),
            Self::Wait => PossibleValue::new("wait"),
            Self::Continue => PossibleValue::new("continue"),
        })
    }
}

impl ValueEnum for OutputMode {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Buffered, Self::Interleaved]
    }

    fn to_possible_value(&self) -> Option<PossibleValue> {
        Some(match self {
            Self::Buffered => PossibleValue::new("buffered"),
            Self::Interleaved => PossibleValue::new("interleaved"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_run_with_trailing_args() {
        let cli = Cli::parse_from(["pt", "run", "build", "--", "--flag"]);
        let Command::Run(opts) = cli.command else {
            panic!("expected Run");
        };
        assert_eq!(opts.task, "build");
        assert_eq!(opts.args, vec!["--flag"]);
    }

    #[test]
    fn parse_multi_with_on_failure_and_output() {
        let cli = Cli::parse_from([
            "pt", "multi", "a", "b", "--parallel", "--on-failure", "continue", "--output",
            "interleaved",
        ]);
        let Command::Multi(opts) = cli.command else {
            panic!("expected Multi");
        };
        assert_eq!(opts.tasks, vec!["a", "b"]);
        assert!(opts.parallel);
        assert_eq!(opts.on_failure, OnFailure::Continue);
        assert_eq!(opts.output, OutputMode::Interleaved);
    }

    #[test]
    fn parse_multi_by_tag_selection() {
        let cli = Cli::parse_from(["pt", "multi", "--tag", "ci", "--tag", "fast", "--match-any"]);
        let Command::Multi(opts) = cli.command else {
            panic!("expected Multi");
        };
        assert!(opts.tasks.is_empty());
        assert_eq!(opts.tag, vec!["ci", "fast"]);
        assert!(opts.match_any);
    }

    #[test]
    fn parse_watch_flags() {
        let cli = Cli::parse_from([
            "pt", "watch", "test", "--pattern", "src/**/*.rs", "--debounce", "2", "--no-clear",
        ]);
        let Command::Watch(opts) = cli.command else {
            panic!("expected Watch");
        };
        assert_eq!(opts.task, "test");
        assert_eq!(opts.pattern, vec!["src/**/*.rs"]);
        assert_eq!(opts.debounce, 2);
        assert!(opts.no_clear);
    }

    #[test]
    fn parse_global_profile_and_config() {
        let cli = Cli::parse_from([
            "pt", "--profile", "dev", "--config", "custom.toml", "check",
        ]);
        assert_eq!(cli.global.profile, Some("dev".to_string()));
        assert_eq!(cli.global.config, Some(PathBuf::from("custom.toml")));
    }

    #[test]
    fn parse_list_filters() {
        let cli = Cli::parse_from(["pt", "list", "--all", "--tag", "ci", "--category", "build"]);
        let Command::List(opts) = cli.command else {
            panic!("expected List");
        };
        assert!(opts.all);
        assert_eq!(opts.tag, vec!["ci"]);
        assert_eq!(opts.category.as_deref(), Some("build"));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["pt", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init(InitOpts { force: true })));
    }

    #[test]
    fn parse_tags_and_check() {
        assert!(matches!(Cli::parse_from(["pt", "tags"]).command, Command::Tags));
        assert!(matches!(Cli::parse_from(["pt", "check"]).command, Command::Check));
    }

    #[test]
    fn parse_pipeline() {
        let cli = Cli::parse_from(["pt", "pipeline", "release"]);
        let Command::Pipeline(opts) = cli.command else {
            panic!("expected Pipeline");
        };
        assert_eq!(opts.name, "release");
    }
}
