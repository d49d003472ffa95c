use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

use crime_forecast::config::Config;
use crime_forecast::data::Dataset;
use crime_forecast::ml::{ModelRepository, Trainer};
use crime_forecast::store::ForecastStore;
use crime_forecast::web::ApiServer;

#[derive(Parser)]
#[command(name = "crime-forecast")]
#[command(about = "Ontario crime incident history and lag-based forecasts")]
struct Cli {
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fit and persist one model per category
    Train {
        /// Record holdout metrics for years from this one onward
        #[arg(long)]
        evaluate_from: Option<i32>,
    },
    /// Serve the read-only forecast API
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crime_forecast=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)?;

    match cli.command {
        Command::Train { evaluate_from } => {
            let dataset = Dataset::load(&config.data.path, &config.data.region)?;
            let repository = ModelRepository::new(&config.models.dir);

            let summary = Trainer::new(&dataset, &repository)
                .with_evaluation(evaluate_from.or(config.training.evaluate_from))
                .train_all()?;

            info!(
                "Saved {} models to {}",
                summary.trained.len(),
                repository.dir().display()
            );
        }
        Command::Serve { port } => {
            info!("Starting Ontario crime forecast API");

            // Dataset and models must be loaded before the listener binds
            let store = Arc::new(ForecastStore::open(&config)?);
            let server = ApiServer::new(store, config.api.clone());

            let port = port.unwrap_or(config.server.port);
            server.start(&config.server.host, port).await?;
        }
    }

    Ok(())
}
