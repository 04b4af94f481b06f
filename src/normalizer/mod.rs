use chrono::{DateTime, Utc};
use html_escape::decode_html_entities;
use serde::{Deserialize, Serialize};

use crate::domain::{Listing, RawListing, SourceConfig};

/// Knobs for the normalization pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Apply the small-price correction below (default: true)
    pub apply_small_price_fix: bool,

    /// Parsed amounts below this are treated as truncated large-unit
    /// prices (default: 100)
    pub small_price_threshold: f64,

    /// Multiplier applied to suspiciously small amounts (default: 1000)
    pub small_price_multiplier: f64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            apply_small_price_fix: true,
            small_price_threshold: 100.0,
            small_price_multiplier: 1000.0,
        }
    }
}

/// Converts raw extractor output into validated listings.
///
/// Pure: no IO, no clocks — the observation timestamp is supplied by
/// the caller, so the same input always yields the same output.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Normalize one raw listing, or `None` if it should be dropped.
    ///
    /// Dropped listings are counted by the caller; they are never
    /// stored as zero-priced rows.
    pub fn normalize(
        &self,
        raw: &RawListing,
        source: &SourceConfig,
        observed_at: DateTime<Utc>,
    ) -> Option<Listing> {
        let name = clean_name(&raw.name);
        if name.is_empty() {
            return None;
        }

        let mut amount = parse_price(&raw.price_text)?;
        if self.config.apply_small_price_fix && amount < self.config.small_price_threshold {
            amount *= self.config.small_price_multiplier;
        }
        if !amount.is_finite() || amount <= 0.0 {
            return None;
        }

        Some(Listing {
            product_name: name,
            price_amount: amount,
            currency: source.currency.clone(),
            source_id: source.id.clone(),
            image_url: raw.image_url.clone(),
            observed_at,
        })
    }
}

/// Decode HTML entities and collapse runs of whitespace.
fn clean_name(name: &str) -> String {
    decode_html_entities(name)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a locale-formatted price string into an amount.
///
/// Grouping separators (spaces, currency text) are stripped; a single
/// `.` or `,` is the decimal marker. Inputs with several markers or no
/// digits at all are rejected rather than guessed at.
pub fn parse_price(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let markers = cleaned.chars().filter(|c| *c == '.' || *c == ',').count();
    if markers > 1 {
        return None;
    }

    cleaned.replace(',', ".").parse::<f64>().ok()
}
