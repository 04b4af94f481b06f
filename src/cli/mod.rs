pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pricescan")]
#[command(about = "Automatic price-scraping scheduler", long_about = None)]
pub struct Cli {
    /// Path to the config file (default: ~/.config/pricescan/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the database file (default: platform data dir)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scheduler in the foreground until interrupted
    Run {
        /// Override the due-check tick interval (e.g., "30s", "5m")
        #[arg(short, long)]
        tick: Option<String>,

        /// Skip the immediate initial pass over all sources
        #[arg(long)]
        no_initial_run: bool,
    },
    /// Scrape one source immediately, bypassing the schedule
    Scrape {
        /// Source id to scrape
        source: String,

        /// Single query to run instead of the source's configured set
        #[arg(short, long)]
        query: Option<String>,
    },
    /// List configured sources
    Sources,
    /// Show per-source scraping status
    Status {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List stored price observations
    Prices {
        /// Only show observations from this source
        #[arg(short, long)]
        source: Option<String>,
    },
}
