use serde::Deserialize;
use std::fs::File;
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// Gateway configuration, loaded from a YAML file at startup.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub listener: Listener,
    /// Optional statsd destination; metrics are discarded when absent.
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub proxy: ProxySettings,
    #[serde(default)]
    pub api: ApiSettings,
}

#[derive(Debug, Deserialize)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub use_proxies: bool,
    pub proxy_file: PathBuf,
    pub direct_fallback: bool,
    pub max_failures: u32,
    /// Blacklist window in seconds.
    pub blacklist_time: u64,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            use_proxies: false,
            proxy_file: PathBuf::from("proxies.txt"),
            direct_fallback: true,
            max_failures: 3,
            blacklist_time: 300,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Admitted requests per client per 60 second window.
    pub rate_limit: usize,
    pub enable_rate_limit: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            rate_limit: 60,
            enable_rate_limit: true,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Config = serde_yaml::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listener.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),

    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("listener port cannot be 0")]
    InvalidPort,
}

/// Reads proxy endpoints from a file, one per line. Blank lines and `#`
/// comments are skipped.
pub fn load_proxy_file(path: &Path) -> Result<Vec<String>, std::io::Error> {
    let file = File::open(path)?;
    let mut endpoints = Vec::new();
    for line in std::io::BufReader::new(file).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        endpoints.push(line.to_string());
    }
    Ok(endpoints)
}

/// Splits a comma-separated endpoint list (the `GATEWAY_PROXIES`
/// environment variable format).
pub fn split_proxy_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write contents");

        tmp
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let yaml = r#"
listener:
    host: "0.0.0.0"
    port: 8000
"#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert!(!config.proxy.use_proxies);
        assert_eq!(config.proxy.proxy_file, PathBuf::from("proxies.txt"));
        assert!(config.proxy.direct_fallback);
        assert_eq!(config.proxy.max_failures, 3);
        assert_eq!(config.proxy.blacklist_time, 300);
        assert_eq!(config.api.rate_limit, 60);
        assert!(config.api.enable_rate_limit);
        assert!(config.metrics.is_none());
    }

    #[test]
    fn full_config_parses() {
        let yaml = r#"
listener:
    host: "127.0.0.1"
    port: 8000
metrics:
    statsd_host: "127.0.0.1"
    statsd_port: 8125
proxy:
    use_proxies: true
    proxy_file: "/etc/gateway/proxies.txt"
    direct_fallback: false
    max_failures: 5
    blacklist_time: 600
api:
    rate_limit: 30
    enable_rate_limit: false
"#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert!(config.proxy.use_proxies);
        assert!(!config.proxy.direct_fallback);
        assert_eq!(config.proxy.max_failures, 5);
        assert_eq!(config.proxy.blacklist_time, 600);
        assert_eq!(config.api.rate_limit, 30);
        assert!(!config.api.enable_rate_limit);
        assert_eq!(config.metrics.unwrap().statsd_port, 8125);
    }

    #[test]
    fn zero_port_fails_validation() {
        let yaml = r#"
listener:
    host: "0.0.0.0"
    port: 0
"#;
        let tmp = write_tmp_file(yaml);
        let err = Config::from_file(tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort));
    }

    #[test]
    fn proxy_file_skips_comments_and_blanks() {
        let tmp = write_tmp_file(
            "# fleet proxies\nhttp://10.0.0.1:8080\n\n  \nsocks5://10.0.0.2:1080\n# trailing\n",
        );
        let endpoints = load_proxy_file(tmp.path()).unwrap();
        assert_eq!(
            endpoints,
            vec![
                "http://10.0.0.1:8080".to_string(),
                "socks5://10.0.0.2:1080".to_string()
            ]
        );
    }

    #[test]
    fn env_list_splits_on_commas() {
        assert_eq!(
            split_proxy_list("http://a:1, http://b:2 ,,http://c:3"),
            vec![
                "http://a:1".to_string(),
                "http://b:2".to_string(),
                "http://c:3".to_string()
            ]
        );
        assert!(split_proxy_list("").is_empty());
    }
}
