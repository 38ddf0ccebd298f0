mod app;
mod cli;
mod client;
mod config;
mod listing;
mod menu;
mod models;
mod observer;
mod retry;
mod scheduler;
mod shutdown;
mod store;
mod zone;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::app::{App, GenerateOverrides};
use crate::cli::{Command, Opts};
use crate::config::GeneratorConfig;
use crate::listing::{ActivityFilter, ListingQuery};
use crate::shutdown::{Cancelled, Shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();
    init_tracing();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(shutdown_signal(shutdown_tx));
    let mut shutdown = Shutdown::new(shutdown_rx);

    let result = execute(opts, &mut shutdown).await;
    match result {
        Err(err) if err.downcast_ref::<Cancelled>().is_some() => {
            println!("\nCancelled by user");
            // A pending stdin read cannot be aborted and would hold up runtime shutdown.
            std::process::exit(0);
        }
        Err(err) => {
            error!("{err:#}");
            Err(err)
        }
        Ok(()) if shutdown.is_triggered() => {
            println!("\nCancelled by user");
            std::process::exit(0);
        }
        Ok(()) => Ok(()),
    }
}

async fn execute(opts: Opts, shutdown: &mut Shutdown) -> Result<()> {
    let config = GeneratorConfig::load().context("Failed to load configuration")?;
    let app = App::connect(config)?;

    match opts.command.unwrap_or(Command::Menu) {
        Command::Generate {
            total,
            batch_size,
            delay,
            max_retries,
        } => {
            let overrides = GenerateOverrides {
                batch_size,
                delay_hours: delay,
                max_retries,
            };
            let request = app.request(total, overrides)?;
            let run = app.generate(&request, shutdown).await;
            if run.is_complete() {
                info!("All {} requested aliases reserved", run.total);
            } else {
                info!("{}/{} aliases reserved", run.completed(), run.total);
            }
        }
        Command::List {
            active: _,
            inactive,
            all,
            search,
            save,
        } => {
            let activity = if all {
                ActivityFilter::All
            } else if inactive {
                ActivityFilter::Inactive
            } else {
                ActivityFilter::Active
            };
            let query = ListingQuery::new(activity, search.as_deref())?;
            app.list(&query, save, shutdown).await?;
        }
        Command::Menu => menu::run(&app, shutdown).await?,
    }
    Ok(())
}

fn init_tracing() {
    let default_filter = "info";
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    assert!(!filter.is_empty(), "Tracing filter must not be empty");
    assert!(filter.len() < 256, "Tracing filter length exceeds bounds");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .compact()
        .init();
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    shutdown_tx.send(true).ok();
    info!("Shutdown signal dispatched");
}
