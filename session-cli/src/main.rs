mod cli;
mod commands;
mod config;

use std::io;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use session_client::{FileStore, SessionManager, TracingNavigator};
use tracing::{Level, debug, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::{
    cli::{Args, Commands},
    commands::CommandExecutor,
    config::AppConfig,
};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Application error: {e:#}");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    init_logging(args.verbose, args.quiet, args.json_logs)?;

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(base_url) = args.base_url {
        config.client.base_url = base_url;
    }

    let store_path = config.store_path(args.store.as_deref())?;
    let store = FileStore::open(&store_path)
        .with_context(|| format!("failed to open credential store {}", store_path.display()))?;
    debug!(store = %store_path.display(), base_url = %config.client.base_url, "Starting sessionctl");

    let manager = SessionManager::new(config.client, Arc::new(store), Arc::new(TracingNavigator))?;
    let executor = CommandExecutor::new(manager);

    match args.command {
        Commands::Login {
            class,
            identifier,
            password,
        } => executor.login(class, &identifier, password).await?,
        Commands::Request {
            method,
            path,
            data,
            query,
        } => {
            executor
                .request(method, &path, data.as_deref(), query)
                .await?
        }
        Commands::Status => executor.status()?,
        Commands::Refresh => executor.refresh().await?,
        Commands::Logout => executor.logout()?,
    }

    Ok(())
}

fn init_logging(verbose: bool, quiet: bool, json: bool) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr; stdout carries command output.
    if json {
        registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(verbose)
                    .with_writer(io::stderr),
            )
            .try_init()?;
    }
    Ok(())
}
