mod cli;
mod commands;
mod config;
mod engine;
mod paths;
mod policy;
mod progress;
mod resource;
mod runner;
mod schema;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command, CopyCommand, ShowCommand, SyncCommand};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// Manifest path given with `--file`
    pub manifest: Option<PathBuf>,
}

fn main() -> Result<()> {
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

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        manifest: cli.file,
    };

    let result = match cli.command {
        Command::Plan(args) => commands::declarative::plan(&ctx, args.target.as_deref(), args.values),
        Command::Apply(args) => commands::declarative::apply(&ctx, &args),
        Command::Validate(args) => commands::declarative::validate(&ctx, args.target.as_deref()),
        Command::Show(cmd) => match cmd {
            ShowCommand::Project { project } => commands::show::project(&ctx, &project),
            ShowCommand::Environment {
                project,
                environment,
            } => commands::show::environment(&ctx, &project, &environment),
            ShowCommand::Flag { project, flag, env } => {
                commands::show::flag(&ctx, &project, &flag, env.as_deref())
            }
            ShowCommand::Variations { project, flag } => commands::show::variations(&ctx, &project, &flag),
            ShowCommand::Segment {
                project,
                environment,
                segment,
            } => commands::show::segment(&ctx, &project, &environment, &segment),
            ShowCommand::Role { role } => commands::show::role(&ctx, &role),
            ShowCommand::Webhook { id } => commands::show::webhook(&ctx, &id),
        },
        Command::Snapshot(args) => commands::snapshot::snapshot(&ctx, &args),
        Command::Restore(args) => commands::snapshot::restore(&ctx, &args),
        Command::Sync(cmd) => match cmd {
            SyncCommand::Flag(args) => commands::sync::flag(&ctx, &args),
            SyncCommand::Segment(args) => commands::sync::segment(&ctx, &args),
        },
        Command::Copy(CopyCommand::Project(args)) => commands::copy::project(&ctx, &args),
        Command::TestData(args) => commands::testdata::generate(&ctx, &args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "flagops", &mut io::stdout());
            Ok(())
        }
    };

    if let Err(e) = &result
        && let Some(api) = e.chain().find_map(|c| c.downcast_ref::<flagapi::Error>())
    {
        let category = api.category();
        ui::dim(&format!("{}: {}", category.description(), category.advice()));
    }
    result
}
