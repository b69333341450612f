//! Application configuration loaded from environment variables.

use domain::RelocationStrategy;

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" | "fmt" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset runs in memory
/// - `QUEUE_NAME`: queue events are published to (default: `"orders"`)
/// - `BLOB_CONTAINER`: container for product images (default: `"product-images"`)
/// - `CONTRACTS_SHARE`: file share for contract documents (default: `"contracts"`)
/// - `RELOCATION_STRATEGY`: `delete-first` or `insert-first` (default: `delete-first`)
/// - `SCAN_PAGE_SIZE`: rows fetched per scan page (default: `100`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub queue_name: String,
    pub blob_container: String,
    pub contracts_share: String,
    pub relocation_strategy: RelocationStrategy,
    pub scan_page_size: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parsed(&lookup, "LOG_FORMAT").unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            queue_name: lookup("QUEUE_NAME").unwrap_or(defaults.queue_name),
            blob_container: lookup("BLOB_CONTAINER").unwrap_or(defaults.blob_container),
            contracts_share: lookup("CONTRACTS_SHARE").unwrap_or(defaults.contracts_share),
            relocation_strategy: parsed(&lookup, "RELOCATION_STRATEGY")
                .unwrap_or(defaults.relocation_strategy),
            scan_page_size: parsed(&lookup, "SCAN_PAGE_SIZE")
                .filter(|size| *size > 0)
                .unwrap_or(defaults.scan_page_size),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "Ignoring invalid setting");
            None
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            queue_name: "orders".to_string(),
            blob_container: "product-images".to_string(),
            contracts_share: "contracts".to_string(),
            relocation_strategy: RelocationStrategy::DeleteThenInsert,
            scan_page_size: 100,
        }
    }
}
