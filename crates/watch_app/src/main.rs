//! `voucher_watch`: watches voucher product pages and posts price changes
//! to a webhook.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use watch_logging::watch_error;

mod commands;
mod config;
mod logging;

#[derive(Debug, Parser)]
#[command(name = "voucher_watch", version, about = "Voucher price watcher", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log at debug level
    #[arg(long, global = true)]
    verbose: bool,

    /// Log to the terminal only
    #[arg(long, global = true)]
    no_log_file: bool,

    /// Configuration file
    #[arg(long, global = true, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Webhook for price notifications; overrides the config file
    #[arg(long, global = true)]
    webhook_url: Option<String>,

    /// Webhook for error notifications; overrides the config file
    #[arg(long, global = true)]
    webhook_error_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
enum Command {
    /// Check every tracked product once and notify about changes
    Scan,
    /// Retry every queued notification once
    DrainQueue,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    logging::initialize(
        logging::LogDestination::from_flags(cli.no_log_file),
        watch_logging::level_for(cli.verbose),
    );

    if let Err(err) = commands::run(cli).await {
        watch_error!("{:#}", err);
        process::exit(1);
    }
}
