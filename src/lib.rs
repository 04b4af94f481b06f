//! # PriceScan
//!
//! An automatic price-scraping scheduler for a price-comparison
//! backend.
//!
//! ## Architecture
//!
//! The crate is a periodic fetch-extract-upsert pipeline with
//! per-source scheduling and failure isolation:
//!
//! ```text
//! Scheduler → SourceRunner → Fetcher → Extractor → Normalizer → Sink
//! ```
//!
//! - [`scheduler`]: decides which sources are due and dispatches them
//!   onto a bounded worker pool
//! - [`runner`]: drives one source's pipeline, isolating per-query
//!   failures
//! - [`fetcher`]: HTTP client with timeout and typed failures
//! - [`extractor`]: CSS-selector-driven listing extraction
//! - [`normalizer`]: price/name normalization and validation
//! - [`sink`]: sqlite persistence with find-or-create upserts
//!
//! ## Quick Start
//!
//! ```bash
//! # Run the scheduler in the foreground
//! pricescan run
//!
//! # Scrape one source right now
//! pricescan scrape carrefour --query telephone
//!
//! # Inspect what has been stored
//! pricescan prices --source carrefour
//! ```

/// Application context and error handling.
///
/// [`AppContext`](app::AppContext) wires together sink, fetcher, and
/// normalizer, and builds the scheduler. Constructed once by the
/// entry point; never a global.
pub mod app;

/// Command-line interface using clap.
///
/// Subcommands: `run`, `scrape <source>`, `sources`, `status`,
/// `prices`.
pub mod cli;

/// Configuration management.
///
/// Loads `~/.config/pricescan/config.toml` (created with commented
/// defaults on first run), applies `PRICESCAN_*` environment
/// overrides, and validates source definitions.
pub mod config;

/// Core domain models.
///
/// - [`SourceConfig`](domain::SourceConfig): one scraped store
/// - [`RawListing`](domain::RawListing) / [`Listing`](domain::Listing):
///   extractor output and its validated form
/// - [`RunState`](domain::RunState): per-source scheduling state
pub mod domain;

/// Listing extraction from fetched pages.
///
/// - [`Extractor`](extractor::Extractor): pluggable extraction seam
/// - [`SelectorExtractor`](extractor::SelectorExtractor): generic
///   CSS-selector-driven implementation
pub mod extractor;

/// HTTP fetching with typed failures.
///
/// - [`Fetcher`](fetcher::Fetcher): async trait for page fetching
/// - [`HttpFetcher`](fetcher::HttpFetcher): reqwest-based
///   implementation
pub mod fetcher;

/// Raw listing normalization.
///
/// Parses locale-formatted price text, rejects malformed entries, and
/// applies the configurable small-price correction.
pub mod normalizer;

/// Per-source pipeline execution.
///
/// [`SourceRunner`](runner::SourceRunner) runs one source's query set
/// sequentially with jittered delays and cooperative cancellation.
pub mod runner;

/// Scheduling and lifecycle.
///
/// [`Scheduler`](scheduler::Scheduler) owns the run states, the tick
/// loop, and the bounded worker pool; exposes `run`/`stop`/`status`/
/// `manual_trigger` as the administrative surface.
pub mod scheduler;

/// Storage port and sqlite implementation.
///
/// - [`Sink`](sink::Sink): idempotent price upserts with
///   find-or-create products and stores
/// - [`SqliteSink`](sink::SqliteSink): rusqlite-backed implementation
pub mod sink;
