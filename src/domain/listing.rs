use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Extractor output, one per scraped item. Names and price text come
/// straight out of the page and may be noisy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawListing {
    pub name: String,
    pub price_text: String,
    pub image_url: Option<String>,
}

impl RawListing {
    pub fn new(name: impl Into<String>, price_text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            price_text: price_text.into(),
            image_url: None,
        }
    }
}

/// A normalized, validated price observation ready for storage.
///
/// Invariant: `price_amount` is finite and positive; the normalizer
/// drops anything that is not rather than storing a zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub product_name: String,
    pub price_amount: f64,
    pub currency: String,
    pub source_id: String,
    pub image_url: Option<String>,
    pub observed_at: DateTime<Utc>,
}
