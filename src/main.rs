use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use ops_iam_core::{config::Config, migration, server, telemetry};
use tracing::info;

#[derive(Parser)]
#[command(name = "ops-iam-core", version, about = "Authorization and directory backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create the database if missing and apply migrations
    Migrate,
    /// Run one directory sync pass and exit
    SyncUsers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    let prometheus_handle = telemetry::init(&config.telemetry)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            info!("Starting ops-iam-core");
            info!("HTTP server listening on {}", config.http_addr());
            server::run(config, prometheus_handle).await
        }
        Command::Migrate => migration::run_migrations(&config).await,
        Command::SyncUsers => {
            let state = server::connect_state(config).await?;
            match state.sync_service.sync_all_users().await {
                Ok(report) => {
                    info!(?report, "Directory sync completed");
                    Ok(())
                }
                Err(e) => bail!("Directory sync failed: {}", e),
            }
        }
    }
}
