use thiserror::Error;

use crate::config::ConfigError;
use crate::extractor::ExtractError;
use crate::fetcher::FetchError;
use crate::sink::SinkError;

#[derive(Error, Debug)]
pub enum PriceScanError {
    #[error("storage error: {0}")]
    Sink(#[from] SinkError),

    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("invalid CSS selector: {0}")]
    InvalidSelector(String),

    #[error("unknown source: {0}")]
    SourceNotFound(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PriceScanError>;
