use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pricescan::app::AppContext;
use pricescan::cli::{commands, Cli, Commands};
use pricescan::config::{parse_interval, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.clone())?;
    if let Commands::Run {
        tick,
        no_initial_run,
    } = &cli.command
    {
        if let Some(tick) = tick {
            config.scheduler.tick_secs = parse_interval(tick).map_err(anyhow::Error::msg)?;
        }
        if *no_initial_run {
            config.scheduler.initial_run = false;
        }
    }

    let ctx = AppContext::new(config, cli.db.clone())?;

    match cli.command {
        Commands::Run { .. } => {
            commands::run(&ctx).await?;
        }
        Commands::Scrape { source, query } => {
            commands::scrape(&ctx, &source, query.as_deref()).await?;
        }
        Commands::Sources => {
            commands::list_sources(&ctx)?;
        }
        Commands::Status { json } => {
            commands::status(&ctx, json)?;
        }
        Commands::Prices { source } => {
            commands::list_prices(&ctx, source.as_deref())?;
        }
    }

    Ok(())
}
