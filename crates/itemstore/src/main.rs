//! itemstore command-line launcher
//!
//! Admin commands reconcile the SQLite schema against the table
//! configuration; item commands read and write documents.

use clap::{Parser, Subcommand};
use itemstore_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

use cli::admin::AdminCommand;
use cli::items::ItemCommand;
use cli::GlobalArgs;

#[derive(Parser, Debug)]
#[command(name = "itemstore", about = "DynamoDB-style document tables on SQLite")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Table configuration file (YAML)
    #[arg(long = "config", global = true, env = "ITEMSTORE_CONFIG", default_value = cli::config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// SQLite database file (default: ~/.itemstore/items.sqlite)
    #[arg(long = "db", global = true, env = "ITEMSTORE_DB")]
    db: Option<PathBuf>,

    /// Secret for signing pagination cursors
    #[arg(long, global = true, env = "ITEMSTORE_CURSOR_SECRET", hide_env_values = true)]
    cursor_secret: Option<String>,

    /// Serve even if the database was not migrated for this configuration
    #[arg(
        long,
        global = true,
        env = "SKIP_CONFIG_VALIDATION",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    skip_config_validation: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(flatten)]
    Admin(AdminCommand),

    #[command(flatten)]
    Item(ItemCommand),
}

fn run_command(cli: Cli) -> anyhow::Result<()> {
    let global = GlobalArgs {
        config_path: cli.config,
        db_path: cli::config::resolve_db_path(cli.db),
        cursor_secret: cli.cursor_secret,
        skip_config_validation: cli.skip_config_validation,
    };

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    rt.block_on(async {
        match cli.command {
            Commands::Admin(command) => cli::admin::run(&global, command).await,
            Commands::Item(command) => cli::items::run(&global, command).await,
        }
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match init_logging(LogConfig {
        app_name: "itemstore",
        verbose: cli.verbose,
    }) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: failed to initialize logging: {:#}", err);
            None
        }
    };

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:?}", err);
            ExitCode::from(1)
        }
    }
}
