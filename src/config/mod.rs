//! Configuration for the pricescan scheduler.
//!
//! Read from `~/.config/pricescan/config.toml` at startup; a commented
//! default file is created on first run. Missing fields fall back to
//! defaults, and a handful of `PRICESCAN_*` environment variables
//! override scheduler settings for deployment tweaking.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::warn;

use crate::domain::SourceConfig;
use crate::fetcher::FetchConfig;
use crate::normalizer::NormalizerConfig;
use crate::scheduler::SchedulerConfig;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub fetch: FetchConfig,
    pub normalizer: NormalizerConfig,
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Load configuration from `path`, or from the default location.
    ///
    /// With no explicit path, a missing file is created with commented
    /// defaults; an explicitly given path must exist.
    pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let (config_path, explicit) = match path {
            Some(p) => (p, true),
            None => (Self::default_config_path()?, false),
        };

        if !config_path.exists() {
            if explicit {
                return Err(ConfigError::Io {
                    path: config_path,
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "config file not found",
                    ),
                });
            }
            Self::create_default_config(&config_path)?;
        }

        let content = fs::read_to_string(&config_path).map_err(|e| ConfigError::Io {
            path: config_path.clone(),
            source: e,
        })?;

        let mut config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path,
            source: e,
        })?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path: `~/.config/pricescan/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("pricescan").join("config.toml"))
    }

    /// Override scheduler fields from `PRICESCAN_*` environment
    /// variables. Unparseable values are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        override_u64("PRICESCAN_TICK_SECS", &mut self.scheduler.tick_secs);
        override_usize("PRICESCAN_MAX_WORKERS", &mut self.scheduler.max_workers);
        override_u64(
            "PRICESCAN_REQUEST_TIMEOUT_SECS",
            &mut self.fetch.timeout_secs,
        );
        override_u32(
            "PRICESCAN_MAX_CONSECUTIVE_ERRORS",
            &mut self.scheduler.max_consecutive_errors,
        );
        override_u64(
            "PRICESCAN_ERROR_COOLDOWN_SECS",
            &mut self.scheduler.error_cooldown_secs,
        );
    }

    /// Check cross-field invariants after parsing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.max_workers == 0 {
            return Err(ConfigError::Invalid("max_workers must be >= 1".into()));
        }
        if self.scheduler.delay_min_ms > self.scheduler.delay_max_ms {
            return Err(ConfigError::Invalid(
                "delay_min_ms must not exceed delay_max_ms".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for source in &self.sources {
            source.validate().map_err(ConfigError::Invalid)?;
            if !seen.insert(source.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate source id '{}'",
                    source.id
                )));
            }
        }

        Ok(())
    }

    /// Create a default config file with comments.
    fn create_default_config(path: &PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.clone(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.clone(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# PriceScan scraper configuration
#
# Scheduling state (last run, error counts, cooldowns) is in-memory
# only: a restart re-runs every enabled source once immediately.

[scheduler]
# Seconds between due-checks
tick_secs = 60

# Maximum sources scraped concurrently
max_workers = 4

# Fully-failed runs before a source cools down, and for how long
max_consecutive_errors = 5
error_cooldown_secs = 300

# Seconds to wait for in-flight runs on shutdown before aborting them
grace_secs = 5

# Run all enabled sources immediately on start
initial_run = true

# Jittered delay between queries within one run (milliseconds)
delay_min_ms = 500
delay_max_ms = 2000

[fetch]
# Per-request timeout in seconds
timeout_secs = 10

# User agent sent with every request
user_agent = "pricescan/0.1.0"

[normalizer]
# Prices parsed below small_price_threshold are multiplied by
# small_price_multiplier, correcting truncated large-unit prices
# ("120" meaning 120 000 FCFA). If a source legitimately sells items
# cheaper than the threshold, disable this per deployment — it will
# silently inflate those prices.
apply_small_price_fix = true
small_price_threshold = 100.0
small_price_multiplier = 1000.0

# One [[sources]] block per scraped store. The examples below are
# disabled placeholders; point them at real storefronts and enable.

[[sources]]
id = "carrefour"
display_name = "Carrefour"
enabled = false
interval_secs = 3600
base_url = "https://www.carrefour.example"
search_url_template = "https://www.carrefour.example/search?q={query}"
currency = "CFA"
queries = ["telephone", "lait", "riz"]

[sources.selectors]
item = ".product-card"
name = ".product-name"
price = ".product-price"
image = "img"

[[sources]]
id = "auchan"
display_name = "Auchan"
enabled = false
interval_secs = 7200
base_url = "https://www.auchan.example"
search_url_template = "https://www.auchan.example/recherche?text={query}"
currency = "CFA"
queries = ["telephone"]

[sources.selectors]
item = ".search-result"
name = ".result-title"
price = ".result-price"
"##
        .to_string()
    }
}

fn override_u64(var: &str, target: &mut u64) {
    if let Ok(value) = std::env::var(var) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!("ignoring {}: '{}' is not a number", var, value),
        }
    }
}

fn override_u32(var: &str, target: &mut u32) {
    if let Ok(value) = std::env::var(var) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!("ignoring {}: '{}' is not a number", var, value),
        }
    }
}

fn override_usize(var: &str, target: &mut usize) {
    if let Ok(value) = std::env::var(var) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!("ignoring {}: '{}' is not a number", var, value),
        }
    }
}

/// Parse an interval string like "1h", "30m", "6h", "1d" into seconds.
pub fn parse_interval(s: &str) -> Result<u64, String> {
    let s = s.trim().to_lowercase();

    if let Some(hours) = s.strip_suffix('h') {
        hours
            .parse::<u64>()
            .map(|h| h * 3600)
            .map_err(|_| format!("Invalid hours: {}", hours))
    } else if let Some(minutes) = s.strip_suffix('m') {
        minutes
            .parse::<u64>()
            .map(|m| m * 60)
            .map_err(|_| format!("Invalid minutes: {}", minutes))
    } else if let Some(days) = s.strip_suffix('d') {
        days.parse::<u64>()
            .map(|d| d * 86400)
            .map_err(|_| format!("Invalid days: {}", days))
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>()
            .map_err(|_| format!("Invalid seconds: {}", secs))
    } else {
        s.parse::<u64>()
            .map_err(|_| format!("Invalid interval: {}. Use format like '1h', '30m', '1d'", s))
    }
}

/// Format an interval in seconds for display.
pub fn format_interval(secs: u64) -> String {
    if secs >= 86400 && secs % 86400 == 0 {
        format!("{}d", secs / 86400)
    } else if secs >= 3600 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
