//! Task runner binary entry point.
use clap::Parser;
use pt::{cli, commands, logging};

fn main() {
    enable_ansi_support::enable_ansi_support().ok();
    let args = cli::Cli::parse();
    let command_name = match &args.command {
        cli::Command::Run(_) => "run",
        cli::Command::Exec(_) => "exec",
        cli::Command::Multi(_) => "multi",
        cli::Command::Pipeline(_) => "pipeline",
        cli::Command::Watch(_) => "watch",
        cli::Command::List(_) => "list",
        cli::Command::Tags => "tags",
        cli::Command::Check => "check",
        cli::Command::Init(_) => "init",
    };
    logging::init_subscriber(args.verbose, command_name);
    let log = std::sync::Arc::new(logging::Logger::new(command_name));

    ctrlc::set_handler(pt::interrupt::request).ok();

    let result = match &args.command {
        cli::Command::Run(opts) => commands::run::run(&args.global, opts, &log),
        cli::Command::Exec(opts) => commands::exec::run(&args.global, opts, &log),
        cli::Command::Multi(opts) => commands::multi::run(&args.global, opts, &log),
        cli::Command::Pipeline(opts) => commands::pipeline::run(&args.global, opts, &log),
        cli::Command::Watch(opts) => commands::watch::run(&args.global, opts, &log),
        cli::Command::List(opts) => commands::list::run(&args.global, opts, &log),
        cli::Command::Tags => commands::tags::run(&args.global, &log),
        cli::Command::Check => commands::check::run(&args.global, &log),
        cli::Command::Init(opts) => commands::init::run(opts, &log),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            log.error(&format!("{e}"));
            std::process::exit(1);
        }
    }
}
