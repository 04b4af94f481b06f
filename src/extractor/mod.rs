mod selector;

pub use selector::SelectorExtractor;

use thiserror::Error;

use crate::domain::RawListing;

/// Why extraction produced nothing.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The page parsed but no listing blocks matched. Expected when a
    /// query simply has no results; not fatal to the run.
    #[error("no listings matched")]
    EmptyResult,

    /// Listing blocks matched but none carried the expected fields, or
    /// the document itself is unusable. Usually means the site layout
    /// changed and the selectors need updating.
    #[error("malformed document: {0}")]
    MalformedDocument(String),
}

/// Parses fetched page content into raw listings.
///
/// Implementations must be deterministic for the same input and must
/// not perform IO. Site-specific behavior lives in selector
/// configuration, not in new scheduler code.
pub trait Extractor: Send + Sync {
    fn extract(&self, content: &[u8]) -> Result<Vec<RawListing>, ExtractError>;
}
