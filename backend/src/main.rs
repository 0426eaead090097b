mod api;
mod cli;
mod config;
mod db;
mod error;
mod models;
mod services;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;

#[derive(Parser)]
#[command(name = "squadsignal")]
#[command(about = "Community lineup signals and live substitution voting")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Initialize the database
    InitDb,
    /// Seed demo crowd lineups and votes
    Seed,
    /// Show the community signal for replacing a player
    Signal {
        #[arg(long)]
        match_id: i64,
        #[arg(long)]
        team_id: i64,
        #[arg(long)]
        player_id: i64,
        #[arg(long)]
        position: String,
        /// Player ids of your current lineup, comma separated
        #[arg(long, value_delimiter = ',')]
        lineup: Vec<i64>,
        #[arg(long, default_value = "4-3-3")]
        formation: String,
    },
    /// Show live substitution vote tallies
    Votes {
        #[arg(long)]
        match_id: i64,
        #[arg(long)]
        team_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env();

    match cli.command {
        Some(Commands::Serve { port }) => {
            tracing::info!("Starting SquadSignal API server on port {}", port);
            api::serve(port, config).await?;
        }
        Some(Commands::InitDb) => {
            tracing::info!("Initializing database...");
            db::init_database(&config.database_url).await?;
        }
        Some(Commands::Seed) => {
            cli::seed(&config).await?;
        }
        Some(Commands::Signal {
            match_id,
            team_id,
            player_id,
            position,
            lineup,
            formation,
        }) => {
            cli::show_signal(&config, match_id, team_id, player_id, &position, &lineup, &formation).await?;
        }
        Some(Commands::Votes { match_id, team_id }) => {
            cli::show_votes(&config, match_id, team_id).await?;
        }
        None => {
            // Default to serving
            tracing::info!("Starting SquadSignal API server on port 3000");
            api::serve(3000, config).await?;
        }
    }

    Ok(())
}
