pub mod http_fetcher;

pub use http_fetcher::HttpFetcher;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a single fetch attempt failed.
///
/// All variants are transient from the scheduler's point of view: the
/// source is retried at its next scheduled run, never within the same
/// attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),
}

/// Options applied to every request a fetcher makes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request timeout in seconds (default: 10)
    pub timeout_secs: u64,

    /// User agent sent with every request
    pub user_agent: String,

    /// Extra headers sent with every request (e.g. Accept-Language)
    pub headers: std::collections::HashMap<String, String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: format!("pricescan/{}", env!("CARGO_PKG_VERSION")),
            headers: std::collections::HashMap::new(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

/// One rate-limited HTTP GET. No retries, no shared state: retry
/// policy belongs to the caller.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}
