use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::{AppContext, Result};
use crate::config::format_interval;
use crate::sink::Sink;

/// Run the scheduler in the foreground until SIGTERM/SIGINT.
pub async fn run(ctx: &AppContext) -> Result<()> {
    let scheduler = Arc::new(ctx.build_scheduler()?);

    #[cfg(unix)]
    {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to set up SIGTERM handler");
            let mut sigint =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
                    .expect("Failed to set up SIGINT handler");

            tokio::select! {
                _ = sigterm.recv() => {},
                _ = sigint.recv() => {},
            }
            scheduler.stop();
        });
    }

    #[cfg(not(unix))]
    {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            scheduler.stop();
        });
    }

    scheduler.run().await;
    Ok(())
}

/// Immediately scrape one source, bypassing the schedule.
pub async fn scrape(ctx: &AppContext, source_id: &str, query: Option<&str>) -> Result<()> {
    let scheduler = ctx.build_scheduler()?;
    let result = scheduler.manual_trigger(source_id, query).await?;

    println!(
        "{}: {}/{} queries ok, {} listings ({} stored, {} dropped)",
        source_id,
        result.queries_succeeded,
        result.queries_attempted,
        result.listings_produced,
        result.listings_stored,
        result.listings_dropped
    );
    for error in &result.errors {
        eprintln!("  {}", error);
    }

    Ok(())
}

pub fn list_sources(ctx: &AppContext) -> Result<()> {
    if ctx.config.sources.is_empty() {
        println!("No sources configured");
        return Ok(());
    }

    for source in &ctx.config.sources {
        let marker = if source.enabled { "on " } else { "off" };
        println!(
            "[{}] {} ({}) every {}, {} queries",
            marker,
            source.id,
            source.display_name(),
            format_interval(source.interval_secs),
            source.queries.len()
        );
    }

    Ok(())
}

#[derive(Serialize)]
struct StatusRow {
    id: String,
    display_name: String,
    enabled: bool,
    interval_secs: u64,
    listings: i64,
    last_observed_at: Option<DateTime<Utc>>,
}

/// Per-source view of what has been scraped so far, derived from the
/// stored data plus the configuration. The live scheduling state
/// (cooldowns, error counts) belongs to a running scheduler process
/// and is exposed there via `Scheduler::status()`.
pub fn status(ctx: &AppContext, json: bool) -> Result<()> {
    let stats = ctx.sink.source_stats()?;

    let rows: Vec<StatusRow> = ctx
        .config
        .sources
        .iter()
        .map(|source| {
            let stat = stats.iter().find(|s| s.source == source.id);
            StatusRow {
                id: source.id.clone(),
                display_name: source.display_name().to_string(),
                enabled: source.enabled,
                interval_secs: source.interval_secs,
                listings: stat.map(|s| s.listings).unwrap_or(0),
                last_observed_at: stat.and_then(|s| s.last_observed_at),
            }
        })
        .collect();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&rows).expect("status rows serialize")
        );
        return Ok(());
    }

    if rows.is_empty() {
        println!("No sources configured");
        return Ok(());
    }

    for row in rows {
        let last = row
            .last_observed_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{} ({}) — {} listings, last observed {}, every {}{}",
            row.id,
            row.display_name,
            row.listings,
            last,
            format_interval(row.interval_secs),
            if row.enabled { "" } else { " [disabled]" }
        );
    }

    Ok(())
}

pub fn list_prices(ctx: &AppContext, source: Option<&str>) -> Result<()> {
    let rows = ctx.sink.list_prices(source)?;

    if rows.is_empty() {
        println!("No prices stored");
        return Ok(());
    }

    for row in rows {
        println!(
            "{} @ {}: {} {} ({}, seen {} times, last {})",
            row.product_name,
            row.store_name,
            row.amount,
            row.currency,
            row.source,
            row.observations,
            row.observed_at.format("%Y-%m-%d %H:%M")
        );
    }

    Ok(())
}
