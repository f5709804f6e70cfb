//! Pistelink - agent link and cache diagnostics for the terrain viewer

use clap::{Parser, Subcommand};
use pistelink_protocol::GridSize;
use tracing::error;

mod commands;

use commands::{
    cache_cleanup_command, cache_clear_command, cache_stats_command, fetch_equipment_command,
    fetch_terrain_command, fetch_weather_command, init_command, monitor_command, offline_command,
    status_command,
};

/// Pistelink - talk to the terrain, weather, and equipment agents
#[derive(Parser)]
#[command(name = "piste")]
#[command(about = "Agent link and cache diagnostics for the terrain viewer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config and cache directory
    Init,
    /// Probe all agents and show cache statistics
    Status,
    /// Fetch data through the degradation coordinator
    Fetch {
        #[command(subcommand)]
        command: FetchCommands,
    },
    /// Check offline availability for a run
    Offline {
        /// Run identifier
        #[arg(short, long)]
        run: String,
        /// Terrain grid resolution
        #[arg(short, long, default_value = "64x64")]
        grid: GridSize,
    },
    /// Manage the tiered cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// Run the periodic health monitor until interrupted
    Monitor {
        /// Probe interval in seconds
        #[arg(short, long, default_value_t = 60)]
        interval: u64,
    },
}

#[derive(Subcommand)]
enum FetchCommands {
    /// Terrain grid for a run
    Terrain {
        /// Run identifier
        #[arg(short, long)]
        run: String,
        /// Grid resolution
        #[arg(short, long, default_value = "64x64")]
        grid: GridSize,
        /// Wire protocol override (json-rpc or mcp)
        #[arg(long)]
        protocol: Option<String>,
    },
    /// Weather for an area
    Weather {
        /// Area identifier
        #[arg(short, long)]
        area: String,
        /// Wire protocol override (json-rpc or mcp)
        #[arg(long)]
        protocol: Option<String>,
    },
    /// Equipment inventory for an area
    Equipment {
        /// Area identifier
        #[arg(short, long)]
        area: String,
        /// Wire protocol override (json-rpc or mcp)
        #[arg(long)]
        protocol: Option<String>,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Entry counts and sizes per category
    Stats,
    /// Remove expired entries
    Cleanup,
    /// Remove everything
    Clear,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt().with_env_filter("debug").init();
    } else {
        tracing_subscriber::fmt::init();
    }

    let result = match cli.command {
        Commands::Init => init_command().await,
        Commands::Status => status_command().await,
        Commands::Fetch { command } => match command {
            FetchCommands::Terrain {
                run,
                grid,
                protocol,
            } => fetch_terrain_command(run, grid, protocol).await,
            FetchCommands::Weather { area, protocol } => {
                fetch_weather_command(area, protocol).await
            }
            FetchCommands::Equipment { area, protocol } => {
                fetch_equipment_command(area, protocol).await
            }
        },
        Commands::Offline { run, grid } => offline_command(run, grid).await,
        Commands::Cache { command } => match command {
            CacheCommands::Stats => cache_stats_command().await,
            CacheCommands::Cleanup => cache_cleanup_command().await,
            CacheCommands::Clear => cache_clear_command().await,
        },
        Commands::Monitor { interval } => monitor_command(interval).await,
    };

    if let Err(e) = result {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}
