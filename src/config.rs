//! Configuration Module
//!
//! Handles loading and managing proxy configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Proxy configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Directory holding cached images
    pub cache_dir: PathBuf,
    /// Total timeout for one outbound fetch, in seconds
    pub fetch_timeout: u64,
    /// Maximum redirect hops followed per fetch
    pub max_redirects: usize,
    /// Largest upstream body accepted, in bytes
    pub max_image_bytes: usize,
    /// Extra host names refused outright (`*.example` matches subdomains)
    pub denied_hosts: Vec<String>,
    /// Host names exempt from the address checks
    pub trusted_hosts: Vec<String>,
    /// Share one upstream fetch between concurrent misses of the same URL
    pub dedupe_in_flight: bool,
    /// Partial-file sweeper interval in seconds
    pub sweep_interval: u64,
    /// Age in seconds after which an abandoned partial write is removed
    pub partial_max_age: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `IMAGE_CACHE_DIR` - Cache directory (default: `.cache/images`)
    /// - `FETCH_TIMEOUT_SECS` - Outbound fetch timeout (default: 10)
    /// - `MAX_REDIRECTS` - Redirect hops (default: 5)
    /// - `MAX_IMAGE_BYTES` - Body size cap (default: 10 MiB)
    /// - `PROXY_DENIED_HOSTS` - Comma separated extra denied hosts
    /// - `PROXY_TRUSTED_HOSTS` - Comma separated trusted hosts
    /// - `DEDUPE_IN_FLIGHT` - `true`/`false` (default: true)
    /// - `SWEEP_INTERVAL_SECS` - Sweeper frequency (default: 300)
    /// - `PARTIAL_MAX_AGE_SECS` - Partial write age limit (default: 600)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            cache_dir: env::var("IMAGE_CACHE_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            fetch_timeout: parse_var("FETCH_TIMEOUT_SECS").unwrap_or(defaults.fetch_timeout),
            max_redirects: parse_var("MAX_REDIRECTS").unwrap_or(defaults.max_redirects),
            max_image_bytes: parse_var("MAX_IMAGE_BYTES").unwrap_or(defaults.max_image_bytes),
            denied_hosts: list_var("PROXY_DENIED_HOSTS"),
            trusted_hosts: list_var("PROXY_TRUSTED_HOSTS"),
            dedupe_in_flight: parse_var("DEDUPE_IN_FLIGHT").unwrap_or(defaults.dedupe_in_flight),
            sweep_interval: parse_var("SWEEP_INTERVAL_SECS").unwrap_or(defaults.sweep_interval),
            partial_max_age: parse_var("PARTIAL_MAX_AGE_SECS")
                .unwrap_or(defaults.partial_max_age),
        }
    }

    /// Outbound fetch timeout as a Duration.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            cache_dir: PathBuf::from(".cache/images"),
            fetch_timeout: 10,
            max_redirects: 5,
            max_image_bytes: 10 * 1024 * 1024,
            denied_hosts: Vec::new(),
            trusted_hosts: Vec::new(),
            dedupe_in_flight: true,
            sweep_interval: 300,
            partial_max_age: 600,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn list_var(name: &str) -> Vec<String> {
    env::var(name)
        .map(|v| split_list(&v))
        .unwrap_or_default()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
