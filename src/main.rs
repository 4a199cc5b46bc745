mod cli;
mod commands;
mod paths;
mod registry;
mod runner;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// Where the machine registry is read from and saved to
    pub registry_path: PathBuf,
    /// Machine picked with `--machine`, overriding the registry default
    pub machine: Option<String>,
    /// Run commands on this host instead of over SSH
    pub local: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            ui::error(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        registry_path: paths::registry_file(cli.config.as_deref())?,
        machine: cli.machine,
        local: cli.local,
    };
    log::debug!("Machine registry: {}", ctx.registry_path.display());

    match cli.command {
        Command::Service(cmd) => commands::service::run(&ctx, cmd),
        Command::Inspect(args) => commands::service::show(&ctx, &args),
        Command::Logs(args) => commands::logs::run(&ctx, &args),
        Command::Machine(cmd) => commands::machine::run(&ctx, cmd),
        Command::Network(cmd) => commands::network::run(&ctx, cmd),
        Command::Volume(cmd) => commands::volume::run(&ctx, cmd),
        Command::Task(cmd) => commands::task::run(&ctx, cmd),
        Command::Secret(cmd) => commands::secret::run(&ctx, cmd),
        Command::Login(args) => commands::login::login(&ctx, &args),
        Command::Logout { registry } => commands::login::logout(&ctx, registry.as_deref()),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "skiff", &mut io::stdout());
            Ok(())
        }
    }
}
