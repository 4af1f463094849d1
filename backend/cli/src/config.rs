use std::time::Duration;

use serde::Deserialize;

use runrelay_assistant::openai::DEFAULT_BASE_URL;

/// runrelay runtime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP server bind address
    pub bind_address: String,
    /// HTTP server port
    pub port: u16,
    /// Assistants API key
    pub api_key: Option<String>,
    /// Assistant whose runs are started
    pub assistant_id: String,
    /// Assistants API endpoint, already resolved for the environment
    pub base_url: String,
    pub poll_interval: Duration,
    pub session_ttl: Duration,
    pub request_timeout: Duration,
    /// Directory for the rolling JSON log, console only when unset
    pub log_dir: Option<String>,
    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            api_key: None,
            assistant_id: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: Duration::from_millis(50),
            session_ttl: Duration::from_secs(30 * 60),
            request_timeout: Duration::from_secs(120),
            log_dir: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str| var(key).and_then(|v| v.trim().parse::<u64>().ok());

        let prod_url = var("OPENAI_BASE_URL").unwrap_or(defaults.base_url);
        let base_url = if var("ENV").as_deref() == Some("dev") {
            var("OPENAI_DEV_BASE_URL").unwrap_or(prod_url)
        } else {
            prod_url
        };

        Self {
            bind_address: var("RUNRELAY_BIND").unwrap_or(defaults.bind_address),
            port: var("PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(defaults.port),
            api_key: var("OPENAI_API_KEY").filter(|k| !k.is_empty()),
            assistant_id: var("OPENAI_ASSISTANT_ID").unwrap_or(defaults.assistant_id),
            base_url,
            poll_interval: number("RUNRELAY_POLL_INTERVAL_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            session_ttl: number("RUNRELAY_SESSION_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_ttl),
            request_timeout: number("RUNRELAY_REQUEST_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            log_dir: var("RUNRELAY_LOG_DIR").filter(|d| !d.is_empty()),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.api_key, None);
        assert_eq!(config.assistant_id, "");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.session_ttl, Duration::from_secs(1800));
        assert_eq!(config.request_timeout, Duration::from_secs(120));
        assert_eq!(config.log_dir, None);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("RUNRELAY_BIND", "127.0.0.1"),
            ("PORT", "9090"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_ASSISTANT_ID", "asst_1"),
            ("RUNRELAY_POLL_INTERVAL_MS", "200"),
            ("RUNRELAY_SESSION_TTL_SECS", "60"),
            ("RUNRELAY_REQUEST_TIMEOUT_SECS", "5"),
            ("RUNRELAY_LOG_DIR", "/var/log/runrelay"),
        ]);
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.port, 9090);
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.assistant_id, "asst_1");
        assert_eq!(config.poll_interval, Duration::from_millis(200));
        assert_eq!(config.session_ttl, Duration::from_secs(60));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.log_dir.as_deref(), Some("/var/log/runrelay"));
    }

    #[test]
    fn test_dev_env_selects_dev_endpoint() {
        let vars = [
            ("OPENAI_BASE_URL", "https://prod.example.com/v1"),
            ("OPENAI_DEV_BASE_URL", "https://dev.example.com/v1"),
        ];
        assert_eq!(config_from(&vars).base_url, "https://prod.example.com/v1");

        let mut dev = vars.to_vec();
        dev.push(("ENV", "dev"));
        assert_eq!(config_from(&dev).base_url, "https://dev.example.com/v1");
    }

    #[test]
    fn test_dev_env_falls_back_to_prod_endpoint() {
        let config = config_from(&[("ENV", "dev")]);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_unparseable_numbers_use_defaults() {
        let config = config_from(&[
            ("PORT", "http"),
            ("RUNRELAY_POLL_INTERVAL_MS", "0"),
            ("RUNRELAY_SESSION_TTL_SECS", "soon"),
            ("OPENAI_API_KEY", ""),
        ]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.session_ttl, Duration::from_secs(1800));
        assert_eq!(config.api_key, None);
    }
}
