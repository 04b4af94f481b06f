use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::domain::SourceConfig;
use crate::extractor::{ExtractError, Extractor};
use crate::fetcher::{FetchError, Fetcher};
use crate::normalizer::Normalizer;
use crate::sink::{Sink, SinkError};

/// Outcome of one `SourceRunner::run` invocation.
#[derive(Debug, Default)]
pub struct RunResult {
    pub queries_attempted: usize,
    pub queries_succeeded: usize,
    pub listings_produced: usize,
    pub listings_stored: usize,
    pub listings_dropped: usize,
    pub errors: Vec<RunError>,
}

impl RunResult {
    /// True when every attempted query failed. Drives the scheduler's
    /// consecutive-error escalation; a run that attempted nothing is
    /// not a failure.
    pub fn all_failed(&self) -> bool {
        self.queries_attempted > 0 && self.queries_succeeded == 0
    }
}

/// One contained per-query failure. Collected, never raised out of
/// the run: a bad query must not abort its siblings.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("query '{query}': {source}")]
    Fetch { query: String, source: FetchError },

    #[error("query '{query}': {source}")]
    Extract { query: String, source: ExtractError },

    #[error("query '{query}': {source}")]
    Sink { query: String, source: SinkError },
}

/// Drives one source's fetch → extract → normalize → sink pipeline.
///
/// Queries run sequentially with a jittered delay between them to
/// respect the per-source rate limit; the shutdown signal is checked
/// between queries so a stop never waits for a whole run.
pub struct SourceRunner {
    source: SourceConfig,
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn Extractor>,
    normalizer: Normalizer,
    sink: Arc<dyn Sink>,
    delay_ms: (u64, u64),
}

impl SourceRunner {
    pub fn new(
        source: SourceConfig,
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn Extractor>,
        normalizer: Normalizer,
        sink: Arc<dyn Sink>,
        delay_ms: (u64, u64),
    ) -> Self {
        Self {
            source,
            fetcher,
            extractor,
            normalizer,
            sink,
            delay_ms,
        }
    }

    pub fn source(&self) -> &SourceConfig {
        &self.source
    }

    pub async fn run(&self, queries: &[String], mut shutdown: watch::Receiver<bool>) -> RunResult {
        let mut result = RunResult::default();
        let source_id = self.source.id.as_str();

        for (i, query) in queries.iter().enumerate() {
            if *shutdown.borrow() {
                debug!("{}: shutdown requested, run interrupted", source_id);
                break;
            }
            if i > 0 && !self.pause_between_queries(&mut shutdown).await {
                debug!("{}: shutdown requested mid-delay, run interrupted", source_id);
                break;
            }

            result.queries_attempted += 1;
            self.run_query(query, &mut result).await;
        }

        info!(
            "{}: run finished, {}/{} queries ok, {} listings ({} stored, {} dropped), {} errors",
            source_id,
            result.queries_succeeded,
            result.queries_attempted,
            result.listings_produced,
            result.listings_stored,
            result.listings_dropped,
            result.errors.len()
        );

        result
    }

    async fn run_query(&self, query: &str, result: &mut RunResult) {
        let source_id = self.source.id.as_str();
        let url = self.source.search_url(query);

        let body = match self.fetcher.fetch(&url).await {
            Ok(body) => body,
            Err(e) => {
                warn!("{}: fetch failed for '{}': {}", source_id, query, e);
                result.errors.push(RunError::Fetch {
                    query: query.to_string(),
                    source: e,
                });
                return;
            }
        };

        let raw_listings = match self.extractor.extract(&body) {
            Ok(raw) => raw,
            Err(ExtractError::EmptyResult) => {
                debug!("{}: no listings for '{}'", source_id, query);
                result.queries_succeeded += 1;
                return;
            }
            Err(e) => {
                // Layout change on the site, most likely. Loud so an
                // operator updates the selectors.
                warn!("{}: extraction failed for '{}': {}", source_id, query, e);
                result.errors.push(RunError::Extract {
                    query: query.to_string(),
                    source: e,
                });
                return;
            }
        };

        result.queries_succeeded += 1;
        let observed_at = Utc::now();

        for raw in &raw_listings {
            let Some(listing) = self.normalizer.normalize(raw, &self.source, observed_at) else {
                debug!("{}: dropped malformed listing '{}'", source_id, raw.name);
                result.listings_dropped += 1;
                continue;
            };

            result.listings_produced += 1;
            match self
                .sink
                .upsert_listing(&listing, self.source.display_name())
            {
                Ok(()) => result.listings_stored += 1,
                Err(e) => {
                    error!(
                        "{}: failed to store '{}': {}",
                        source_id, listing.product_name, e
                    );
                    result.errors.push(RunError::Sink {
                        query: query.to_string(),
                        source: e,
                    });
                }
            }
        }
    }

    /// Jittered inter-query delay. Returns false if shutdown was
    /// signalled while waiting.
    async fn pause_between_queries(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let (min, max) = self.delay_ms;
        let wait = if max > min {
            rand::thread_rng().gen_range(min..=max)
        } else {
            min
        };

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(wait)) => true,
            _ = shutdown.changed() => false,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::domain::RawListing;
    use crate::sink::{PriceRow, SourceStats};

    /// Serves canned bodies per URL substring; URLs with no match fail
    /// with a network error.
    pub struct FakeFetcher {
        pub responses: HashMap<String, Vec<u8>>,
        pub calls: AtomicUsize,
    }

    impl FakeFetcher {
        pub fn new(responses: HashMap<String, Vec<u8>>) -> Self {
            Self {
                responses,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .iter()
                .find(|(needle, _)| url.contains(needle.as_str()))
                .map(|(_, body)| body.clone())
                .ok_or_else(|| FetchError::Network(format!("no response configured for {url}")))
        }
    }

    /// Parses the fake page format "name|price;name|price;..."
    pub struct FakeExtractor;

    impl Extractor for FakeExtractor {
        fn extract(&self, content: &[u8]) -> Result<Vec<RawListing>, ExtractError> {
            let text = String::from_utf8_lossy(content);
            if text.trim().is_empty() {
                return Err(ExtractError::EmptyResult);
            }
            if text.trim() == "garbage" {
                return Err(ExtractError::MalformedDocument("not a search page".into()));
            }

            Ok(text
                .split(';')
                .filter_map(|entry| {
                    let (name, price) = entry.split_once('|')?;
                    Some(RawListing::new(name, price))
                })
                .collect())
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct StoredPrice {
        pub product_name: String,
        pub store_name: String,
        pub amount: f64,
        pub currency: String,
        pub source: String,
    }

    /// In-memory sink that records every upsert; optionally fails.
    #[derive(Default)]
    pub struct RecordingSink {
        pub stored: Mutex<Vec<StoredPrice>>,
        pub fail: bool,
    }

    impl RecordingSink {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        pub fn records(&self) -> Vec<StoredPrice> {
            self.stored.lock().unwrap().clone()
        }
    }

    impl Sink for RecordingSink {
        fn upsert_price(
            &self,
            product_name: &str,
            store_name: &str,
            amount: f64,
            currency: &str,
            source: &str,
            _observed_at: DateTime<Utc>,
        ) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::Database(rusqlite::Error::InvalidQuery));
            }
            self.stored.lock().unwrap().push(StoredPrice {
                product_name: product_name.to_string(),
                store_name: store_name.to_string(),
                amount,
                currency: currency.to_string(),
                source: source.to_string(),
            });
            Ok(())
        }

        fn list_prices(&self, _source: Option<&str>) -> Result<Vec<PriceRow>, SinkError> {
            Ok(Vec::new())
        }

        fn source_stats(&self) -> Result<Vec<SourceStats>, SinkError> {
            Ok(Vec::new())
        }
    }

    pub fn test_source(id: &str) -> SourceConfig {
        SourceConfig {
            id: id.to_string(),
            display_name: "Carrefour".to_string(),
            base_url: "https://shop.example".to_string(),
            search_url_template: "https://shop.example/search?q={query}".to_string(),
            currency: "CFA".to_string(),
            queries: vec!["phone".to_string()],
            ..Default::default()
        }
    }

    pub fn shutdown_pair() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }
}
