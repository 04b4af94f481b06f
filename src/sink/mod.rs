pub mod sqlite;

pub use sqlite::SqliteSink;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Listing;

/// Persistence failure. Logged by the runner but never fatal to a run:
/// getting data and storing all of it are separate concerns.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("connection lock poisoned: {0}")]
    Poisoned(String),
}

/// A stored price observation, as read back for operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceRow {
    pub product_name: String,
    pub store_name: String,
    pub amount: f64,
    pub currency: String,
    pub source: String,
    pub image_url: Option<String>,
    pub observed_at: DateTime<Utc>,
    pub observations: i64,
}

/// Per-source aggregate over stored prices, for the status view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceStats {
    pub source: String,
    pub listings: i64,
    pub last_observed_at: Option<DateTime<Utc>>,
}

/// Storage port for the scraping pipeline.
///
/// `upsert_price` has find-or-create semantics for both the product
/// and the store, and must be idempotent under concurrent calls for
/// different `(product, store)` keys — uniqueness is enforced by the
/// storage layer, not by callers.
pub trait Sink: Send + Sync {
    fn upsert_price(
        &self,
        product_name: &str,
        store_name: &str,
        amount: f64,
        currency: &str,
        source: &str,
        observed_at: DateTime<Utc>,
    ) -> Result<(), SinkError>;

    /// Persist a normalized listing against a store. The default
    /// forwards to `upsert_price`; implementations may also keep
    /// auxiliary fields such as the image URL.
    fn upsert_listing(&self, listing: &Listing, store_name: &str) -> Result<(), SinkError> {
        self.upsert_price(
            &listing.product_name,
            store_name,
            listing.price_amount,
            &listing.currency,
            &listing.source_id,
            listing.observed_at,
        )
    }

    fn list_prices(&self, source: Option<&str>) -> Result<Vec<PriceRow>, SinkError>;

    fn source_stats(&self) -> Result<Vec<SourceStats>, SinkError>;
}
