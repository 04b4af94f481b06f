use std::path::PathBuf;
use std::sync::Arc;

use crate::app::error::{PriceScanError, Result};
use crate::config::Config;
use crate::extractor::SelectorExtractor;
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::normalizer::Normalizer;
use crate::runner::SourceRunner;
use crate::scheduler::Scheduler;
use crate::sink::SqliteSink;

/// Wires the components together. Constructed once by the entry point
/// and passed to whatever needs it — nothing here is a global.
pub struct AppContext {
    pub config: Config,
    pub sink: Arc<SqliteSink>,
    pub fetcher: Arc<dyn Fetcher>,
    pub normalizer: Normalizer,
}

impl AppContext {
    pub fn new(config: Config, db_path: Option<PathBuf>) -> Result<Self> {
        let db_path = match db_path {
            Some(p) => p,
            None => Self::default_db_path()?,
        };

        let sink = Arc::new(SqliteSink::new(&db_path)?);
        Ok(Self::with_sink(config, sink))
    }

    pub fn in_memory(config: Config) -> Result<Self> {
        let sink = Arc::new(SqliteSink::in_memory()?);
        Ok(Self::with_sink(config, sink))
    }

    fn with_sink(config: Config, sink: Arc<SqliteSink>) -> Self {
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(&config.fetch));
        let normalizer = Normalizer::new(config.normalizer.clone());

        Self {
            config,
            sink,
            fetcher,
            normalizer,
        }
    }

    /// Build a scheduler over every configured source. Selector
    /// compilation happens here, so config typos fail at startup.
    pub fn build_scheduler(&self) -> Result<Scheduler> {
        let delay = (
            self.config.scheduler.delay_min_ms,
            self.config.scheduler.delay_max_ms,
        );

        let mut runners = Vec::with_capacity(self.config.sources.len());
        for source in &self.config.sources {
            let extractor = Arc::new(SelectorExtractor::from_config(&source.selectors)?);
            runners.push(SourceRunner::new(
                source.clone(),
                self.fetcher.clone(),
                extractor,
                self.normalizer.clone(),
                self.sink.clone(),
                delay,
            ));
        }

        Ok(Scheduler::new(self.config.scheduler.clone(), runners))
    }

    fn default_db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| PriceScanError::Other("Could not find data directory".into()))?;
        let pricescan_dir = data_dir.join("pricescan");
        std::fs::create_dir_all(&pricescan_dir)?;
        Ok(pricescan_dir.join("pricescan.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SourceConfig;

    fn config_with_source() -> Config {
        Config {
            sources: vec![SourceConfig {
                id: "carrefour".into(),
                display_name: "Carrefour".into(),
                base_url: "https://shop.example".into(),
                search_url_template: "https://shop.example/search?q={query}".into(),
                queries: vec!["phone".into()],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_in_memory_context_builds_scheduler() {
        let ctx = AppContext::in_memory(config_with_source()).unwrap();
        let scheduler = ctx.build_scheduler().unwrap();
        assert_eq!(scheduler.status().len(), 1);
    }

    #[test]
    fn test_bad_selector_fails_at_startup() {
        let mut config = config_with_source();
        config.sources[0].selectors.item = ":::".into();

        let ctx = AppContext::in_memory(config).unwrap();
        assert!(ctx.build_scheduler().is_err());
    }
}
