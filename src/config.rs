//! Runtime configuration.
//!
//! Every component receives a [`TrackerConfig`] built once at startup. Values
//! come from built-in defaults, then environment variables (a `.env` file is
//! honoured), then command-line overrides applied by the binary.

use crate::error::TrackerError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// CoinGecko public API root
pub const DEFAULT_API_URL: &str = "https://api.coingecko.com/api/v3";

/// Largest page the markets endpoint serves in one request
pub const MAX_TOP_N: usize = 250;

pub const SNAPSHOT_FILE: &str = "crypto_snapshot.csv";
pub const HISTORY_FILE: &str = "crypto_history.csv";
pub const ALERT_FILE: &str = "alerts.csv";
pub const SUMMARY_FILE: &str = "crypto_summary.csv";
pub const GAINERS_FILE: &str = "top_gainers.csv";
pub const LOSERS_FILE: &str = "top_losers.csv";
pub const DASHBOARD_LOG_FILE: &str = "dashboard.log";

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub data_dir: PathBuf,
    /// Directory holding the alert file
    pub log_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Absolute 24h change, in percent, at or above which a coin is flagged
    pub threshold: f64,
    pub top_n: usize,
    /// Rows kept in each of the gainers/losers reports
    pub report_top: usize,
    pub poll_interval: Duration,
    pub vs_currency: String,
    pub api_url: String,
    pub request_timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            log_dir: PathBuf::from("logs"),
            output_dir: PathBuf::from("outputs"),
            threshold: 5.0,
            top_n: 60,
            report_top: 10,
            poll_interval: Duration::from_secs(30),
            vs_currency: "usd".to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl TrackerConfig {
    /// Load `.env` (if any) and layer `TRACKER_*` variables over the defaults.
    /// Values are parsed but not range-checked; call [`validate`] once every
    /// override has been applied.
    ///
    /// [`validate`]: TrackerConfig::validate
    pub fn from_env() -> Result<Self, TrackerError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TrackerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup("TRACKER_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("TRACKER_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("TRACKER_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("TRACKER_ALERT_THRESHOLD") {
            config.threshold = parse_var("TRACKER_ALERT_THRESHOLD", &raw)?;
        }
        if let Some(raw) = lookup("TRACKER_TOP_N") {
            config.top_n = parse_var("TRACKER_TOP_N", &raw)?;
        }
        if let Some(raw) = lookup("TRACKER_REPORT_TOP") {
            config.report_top = parse_var("TRACKER_REPORT_TOP", &raw)?;
        }
        if let Some(raw) = lookup("TRACKER_POLL_SECS") {
            config.poll_interval = Duration::from_secs(parse_var("TRACKER_POLL_SECS", &raw)?);
        }
        if let Some(currency) = lookup("TRACKER_VS_CURRENCY") {
            config.vs_currency = currency.to_lowercase();
        }
        if let Some(url) = lookup("TRACKER_API_URL") {
            config.api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(raw) = lookup("TRACKER_HTTP_TIMEOUT_SECS") {
            config.request_timeout =
                Duration::from_secs(parse_var("TRACKER_HTTP_TIMEOUT_SECS", &raw)?);
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.top_n == 0 || self.top_n > MAX_TOP_N {
            return Err(TrackerError::Config(format!(
                "top_n must be between 1 and {}, got {}",
                MAX_TOP_N, self.top_n
            )));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(TrackerError::Config(format!(
                "threshold must be a non-negative percentage, got {}",
                self.threshold
            )));
        }
        if self.poll_interval < Duration::from_secs(1) {
            return Err(TrackerError::Config(
                "poll interval must be at least one second".to_string(),
            ));
        }
        if self.vs_currency.is_empty() {
            return Err(TrackerError::Config("vs_currency is empty".to_string()));
        }
        Ok(())
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE)
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join(HISTORY_FILE)
    }

    pub fn alert_path(&self) -> PathBuf {
        self.log_dir.join(ALERT_FILE)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.output_dir.join(SUMMARY_FILE)
    }

    pub fn gainers_path(&self) -> PathBuf {
        self.output_dir.join(GAINERS_FILE)
    }

    pub fn losers_path(&self) -> PathBuf {
        self.output_dir.join(LOSERS_FILE)
    }

    pub fn dashboard_log_path(&self) -> PathBuf {
        self.log_dir.join(DASHBOARD_LOG_FILE)
    }
}

fn parse_var<T: FromStr>(key: &str, raw: &str) -> Result<T, TrackerError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| TrackerError::Config(format!("{} has invalid value '{}'", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = TrackerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, TrackerConfig::default());
        assert_eq!(config.snapshot_path(), PathBuf::from("data/crypto_snapshot.csv"));
        assert_eq!(config.alert_path(), PathBuf::from("logs/alerts.csv"));
        assert_eq!(config.losers_path(), PathBuf::from("outputs/top_losers.csv"));
        assert_eq!(config.dashboard_log_path(), PathBuf::from("logs/dashboard.log"));
    }

    #[test]
    fn test_env_overrides() {
        let config = TrackerConfig::from_lookup(lookup_from(&[
            ("TRACKER_DATA_DIR", "/tmp/market"),
            ("TRACKER_ALERT_THRESHOLD", "2.5"),
            ("TRACKER_TOP_N", "100"),
            ("TRACKER_POLL_SECS", "5"),
            ("TRACKER_VS_CURRENCY", "EUR"),
            ("TRACKER_API_URL", "http://localhost:8080/api/"),
        ]))
        .unwrap();

        assert_eq!(config.history_path(), PathBuf::from("/tmp/market/crypto_history.csv"));
        assert_eq!(config.threshold, 2.5);
        assert_eq!(config.top_n, 100);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.vs_currency, "eur");
        assert_eq!(config.api_url, "http://localhost:8080/api");
    }

    #[test]
    fn test_rejects_unparseable_value() {
        let result = TrackerConfig::from_lookup(lookup_from(&[("TRACKER_TOP_N", "sixty")]));
        assert!(matches!(result, Err(TrackerError::Config(_))));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        for pairs in [
            [("TRACKER_TOP_N", "0")],
            [("TRACKER_TOP_N", "251")],
            [("TRACKER_ALERT_THRESHOLD", "-1")],
            [("TRACKER_POLL_SECS", "0")],
        ] {
            let config = TrackerConfig::from_lookup(lookup_from(&pairs)).unwrap();
            let result = config.validate();
            assert!(matches!(result, Err(TrackerError::Config(_))), "{:?}", pairs);
        }
    }

    #[test]
    fn test_out_of_range_env_value_can_be_overridden() {
        let mut config =
            TrackerConfig::from_lookup(lookup_from(&[("TRACKER_TOP_N", "300")])).unwrap();
        assert_eq!(config.top_n, 300);

        config.top_n = 50;
        assert!(config.validate().is_ok());
    }
}
