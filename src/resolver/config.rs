// Resolver configuration - timeouts, retry, identities, endpoints
//
// Loaded from an optional TOML file, then overridden from environment:
// - POSTGRAB_PROXY          proxy URL (http://, socks5://, socks5h://)
// - POSTGRAB_TIMEOUT_SECS   per-request deadline
// - POSTGRAB_STRATEGIES     comma separated strategy order

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Invalid proxy URL: {0}")]
    InvalidProxy(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// Upstream surfaces the chain can query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Browser-identity JSON detail endpoint
    Web,
    /// App-identity feed endpoint
    Mobile,
    /// App-identity batch detail endpoint
    Bulk,
    /// Rendered page with embedded state blob
    Html,
    /// Third-party aggregator, last resort
    Aggregator,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 5] = [
        Self::Web,
        Self::Mobile,
        Self::Bulk,
        Self::Html,
        Self::Aggregator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Mobile => "mobile",
            Self::Bulk => "bulk",
            Self::Html => "html",
            Self::Aggregator => "aggregator",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "web" => Ok(Self::Web),
            "mobile" => Ok(Self::Mobile),
            "bulk" => Ok(Self::Bulk),
            "html" => Ok(Self::Html),
            "aggregator" => Ok(Self::Aggregator),
            other => Err(ConfigError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Bounded retry for a single network call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based: the wait after the first failure is attempt 1)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1) as i32;
        let ms = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exp);
        Duration::from_millis((ms as u64).min(self.max_backoff_ms))
    }
}

/// Base URLs of the upstream surfaces (overridable for mirrors and tests)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub web_base: String,
    pub mobile_base: String,
    pub aggregator_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            web_base: "https://www.tiktok.com".to_string(),
            mobile_base: "https://api16-normal-c-useast1a.tiktokv.com".to_string(),
            aggregator_base: "https://www.tikwm.com".to_string(),
        }
    }
}

impl Endpoints {
    pub fn web(&self, path: &str) -> String {
        join_base(&self.web_base, path)
    }

    pub fn mobile(&self, path: &str) -> String {
        join_base(&self.mobile_base, path)
    }

    pub fn aggregator(&self, path: &str) -> String {
        join_base(&self.aggregator_base, path)
    }
}

fn join_base(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Marker substitution that turns a branded media URL into the unbranded one
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkRule {
    pub marker: String,
    pub replacement: String,
}

impl Default for WatermarkRule {
    fn default() -> Self {
        Self {
            marker: "playwm".to_string(),
            replacement: "play".to_string(),
        }
    }
}

/// Configuration for the whole resolution pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Deadline for each API/page request in seconds
    pub request_timeout_secs: u64,
    /// Deadline for each redirect hop in seconds
    pub redirect_timeout_secs: u64,
    pub max_redirects: usize,
    /// Deadline for size probes in seconds
    pub probe_timeout_secs: u64,
    /// Overall deadline for one strategy, retries included
    pub strategy_timeout_secs: u64,
    /// Deadline to receive response headers of a media stream
    pub stream_connect_timeout_secs: u64,
    /// Maximum silence between two chunks of a media stream
    pub stream_idle_timeout_secs: u64,
    pub retry: RetryPolicy,
    /// SOCKS5/HTTP proxy URL
    pub proxy: Option<String>,
    pub desktop_user_agent: String,
    pub mobile_user_agent: String,
    pub endpoints: Endpoints,
    pub watermark: WatermarkRule,
    /// Strategy order; first success wins
    pub strategies: Vec<StrategyKind>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            redirect_timeout_secs: 10,
            max_redirects: 10,
            probe_timeout_secs: 10,
            strategy_timeout_secs: 25,
            stream_connect_timeout_secs: 15,
            stream_idle_timeout_secs: 30,
            retry: RetryPolicy::default(),
            proxy: None,
            desktop_user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36".to_string(),
            mobile_user_agent: "com.zhiliaoapp.musically/2023100040 (Linux; U; Android 13; en_US; Pixel 7; Build/TQ3A.230805.001; Cronet/TTNetVersion:5f9640e3 2023-06-06 QuicVersion:12a1d5c5 2023-06-02)".to_string(),
            endpoints: Endpoints::default(),
            watermark: WatermarkRule::default(),
            strategies: StrategyKind::ALL.to_vec(),
        }
    }
}

impl ResolverConfig {
    /// Default config file location: <config dir>/postgrab/config.toml
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("postgrab").join("config.toml"))
    }

    /// Read the TOML file if present, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut config = match path {
            Some(p) if p.exists() => Self::from_file(&p)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from a variable lookup (the process environment in production)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(proxy) = lookup("POSTGRAB_PROXY").filter(|p| !p.trim().is_empty()) {
            self.proxy = Some(proxy.trim().to_string());
        }
        if let Some(raw) = lookup("POSTGRAB_TIMEOUT_SECS") {
            let secs = raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: "POSTGRAB_TIMEOUT_SECS",
                value: raw.clone(),
            })?;
            self.request_timeout_secs = secs;
        }
        if let Some(raw) = lookup("POSTGRAB_STRATEGIES") {
            self.strategies = raw
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(StrategyKind::from_str)
                .collect::<Result<Vec<_>, _>>()?;
        }
        Ok(())
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout_secs = seconds;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_strategies(mut self, strategies: Vec<StrategyKind>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Point every upstream surface at one base URL
    pub fn with_base_url(mut self, base: &str) -> Self {
        self.endpoints = Endpoints {
            web_base: base.to_string(),
            mobile_base: base.to_string(),
            aggregator_base: base.to_string(),
        };
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn redirect_timeout(&self) -> Duration {
        Duration::from_secs(self.redirect_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_secs(self.strategy_timeout_secs)
    }

    pub fn stream_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_connect_timeout_secs)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_backoff_grows_and_caps() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.backoff(1), Duration::from_millis(500));
        assert_eq!(retry.backoff(2), Duration::from_millis(1000));
        assert_eq!(retry.backoff(3), Duration::from_millis(2000));
        assert_eq!(retry.backoff(10), Duration::from_millis(5000));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ResolverConfig::from_toml(
            r#"
            request_timeout_secs = 4
            strategies = ["html", "web"]

            [retry]
            max_attempts = 5

            [endpoints]
            web_base = "http://localhost:9000"
            "#,
        )
        .unwrap();

        assert_eq!(config.request_timeout_secs, 4);
        assert_eq!(config.strategies, vec![StrategyKind::Html, StrategyKind::Web]);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_backoff_ms, 500);
        assert_eq!(config.endpoints.web_base, "http://localhost:9000");
        assert_eq!(config.endpoints.aggregator_base, "https://www.tikwm.com");
        assert_eq!(config.max_redirects, 10);
        assert_eq!(config.watermark.marker, "playwm");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "probe_timeout_secs = 3").unwrap();

        let config = ResolverConfig::from_file(file.path()).unwrap();
        assert_eq!(config.probe_timeout_secs, 3);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("POSTGRAB_PROXY", "socks5h://127.0.0.1:1080"),
            ("POSTGRAB_TIMEOUT_SECS", "7"),
            ("POSTGRAB_STRATEGIES", "mobile, aggregator"),
        ]
        .into_iter()
        .collect();

        let mut config = ResolverConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.proxy.as_deref(), Some("socks5h://127.0.0.1:1080"));
        assert_eq!(config.request_timeout_secs, 7);
        assert_eq!(
            config.strategies,
            vec![StrategyKind::Mobile, StrategyKind::Aggregator]
        );
    }

    #[test]
    fn test_builder_overrides() {
        let config = ResolverConfig::default()
            .with_timeout(3)
            .with_proxy(Some("http://127.0.0.1:8080".to_string()));
        assert_eq!(config.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.proxy.as_deref(), Some("http://127.0.0.1:8080"));
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let mut config = ResolverConfig::default();
        let err = config
            .apply_env(|k| (k == "POSTGRAB_STRATEGIES").then(|| "web,ftp".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStrategy(s) if s == "ftp"));
    }

    #[test]
    fn test_endpoint_join() {
        let endpoints = Endpoints {
            web_base: "http://127.0.0.1:1234/".to_string(),
            ..Endpoints::default()
        };
        assert_eq!(
            endpoints.web("/api/item/detail/"),
            "http://127.0.0.1:1234/api/item/detail/"
        );
    }
}
