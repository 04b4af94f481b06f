use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Static configuration for one scraped store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Unique source key, e.g. "carrefour"
    pub id: String,

    /// Human-readable store name; also the store row name in the database
    pub display_name: String,

    /// Disabled sources are never scheduled
    pub enabled: bool,

    /// Minimum seconds between runs (default: 3600)
    pub interval_secs: u64,

    /// Site root, e.g. "https://www.carrefour.example"
    pub base_url: String,

    /// Search URL with a `{query}` placeholder
    pub search_url_template: String,

    /// Currency code recorded for this source's listings
    pub currency: String,

    /// Search terms scraped on each run
    pub queries: Vec<String>,

    /// CSS selectors driving the generic extractor
    pub selectors: SelectorSet,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            display_name: String::new(),
            enabled: true,
            interval_secs: 3600,
            base_url: String::new(),
            search_url_template: String::new(),
            currency: "CFA".to_string(),
            queries: Vec::new(),
            selectors: SelectorSet::default(),
        }
    }
}

impl SourceConfig {
    /// Minimum time between runs as a Duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn display_name(&self) -> &str {
        if self.display_name.is_empty() {
            &self.id
        } else {
            &self.display_name
        }
    }

    /// Expand the search URL template for one query, percent-encoding it
    pub fn search_url(&self, query: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        self.search_url_template.replace("{query}", &encoded)
    }

    /// Check the invariants a usable source must satisfy
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("source id must not be empty".to_string());
        }
        if self.interval_secs == 0 {
            return Err(format!("source '{}': interval must be > 0", self.id));
        }
        if !self.search_url_template.contains("{query}") {
            return Err(format!(
                "source '{}': search_url_template must contain a {{query}} placeholder",
                self.id
            ));
        }
        if url::Url::parse(&self.base_url).is_err() {
            return Err(format!(
                "source '{}': base_url '{}' is not a valid URL",
                self.id, self.base_url
            ));
        }
        Ok(())
    }
}

/// CSS selectors used by the generic extractor to locate listings
/// within a search result page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorSet {
    /// Selector matching one listing block per product
    pub item: String,
    /// Selector for the product name, scoped to the listing block
    pub name: String,
    /// Selector for the price text, scoped to the listing block
    pub price: String,
    /// Optional selector for the product image
    pub image: Option<String>,
}

impl Default for SelectorSet {
    fn default() -> Self {
        Self {
            item: ".product-card".to_string(),
            name: ".product-name".to_string(),
            price: ".product-price".to_string(),
            image: Some("img".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_source() -> SourceConfig {
        SourceConfig {
            id: "carrefour".into(),
            display_name: "Carrefour".into(),
            base_url: "https://www.carrefour.example".into(),
            search_url_template: "https://www.carrefour.example/search?q={query}".into(),
            queries: vec!["phone".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_search_url_encodes_query() {
        let source = sample_source();
        assert_eq!(
            source.search_url("lait en poudre"),
            "https://www.carrefour.example/search?q=lait+en+poudre"
        );
    }

    #[test]
    fn test_search_url_plain_query() {
        let source = sample_source();
        assert_eq!(
            source.search_url("phone"),
            "https://www.carrefour.example/search?q=phone"
        );
    }

    #[test]
    fn test_validate_ok() {
        assert!(sample_source().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut source = sample_source();
        source.interval_secs = 0;
        assert!(source.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_missing_placeholder() {
        let mut source = sample_source();
        source.search_url_template = "https://www.carrefour.example/search".into();
        assert!(source.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_id() {
        let mut source = sample_source();
        source.id = "  ".into();
        assert!(source.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let mut source = sample_source();
        source.base_url = "not a url".into();
        assert!(source.validate().is_err());
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        let mut source = sample_source();
        source.display_name = String::new();
        assert_eq!(source.display_name(), "carrefour");
    }

    #[test]
    fn test_interval_duration() {
        let source = sample_source();
        assert_eq!(source.interval(), Duration::from_secs(3600));
    }
}
