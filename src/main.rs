mod aggregator;
mod cli;
mod client;
mod commands;
mod config;
mod error;
mod models;
mod report;

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use client::QuotaClient;
use commands::{show_overview, show_quota, show_today};
use config::Config;
use error::QueryError;

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout carries only the report
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn"))
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(report) => {
            println!("{}", report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            if let Some(query) = e.downcast_ref::<QueryError>() {
                debug!("{} fetch aborted the report", query.fetch());
            }
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<String> {
    let config = Config::load(cli.overrides())?;
    debug!("Querying {}", config.base_url);
    let client = QuotaClient::new(&config)?;

    match cli.command.unwrap_or_default() {
        Commands::Overview { json, no_credentials } => {
            show_overview(&client, json, !no_credentials).await
        }
        Commands::Today { json } => show_today(&client, json).await,
        Commands::Quota { json } => show_quota(&client, &config.max_render, json).await,
    }
}
