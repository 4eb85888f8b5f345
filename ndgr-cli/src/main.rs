mod cli;
mod commands;

use crate::cli::{Args, Commands};
use clap::Parser;
use colored::*;
use std::path::PathBuf;
use std::process;
use tracing::{Level, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Application error: {:#}", e);
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    init_logging(args.verbose, args.quiet);
    ndgr_client::install_rustls_provider();

    let settings_path = args.config.unwrap_or_else(default_settings_path);

    match args.command {
        Commands::Watch {
            uri,
            backward,
            at,
            speak,
            json,
        } => {
            commands::watch(commands::WatchOptions {
                settings_path,
                uri,
                num_backward: backward,
                start_at: at,
                speak,
                json,
            })
            .await
        }
        Commands::RelayTest {
            comment,
            user_id,
            name,
            owner,
        } => commands::relay_test(&settings_path, comment, user_id, name, owner).await,
        Commands::Config { show, reset } => {
            if reset {
                commands::reset_settings(&settings_path).await?;
                println!("✓ Settings reset to defaults");
            } else if show {
                println!("{}", commands::show_settings(&settings_path).await?);
            } else {
                println!("Use --show to display current settings or --reset to reset to defaults");
            }
            Ok(())
        }
    }
}

fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ndgr")
        .join("settings.json")
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(verbose)
                .with_writer(std::io::stderr),
        )
        .init();
}
