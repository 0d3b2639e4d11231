// Server settings read from the environment

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    /// JSON file with the engine settings; engine defaults when unset.
    pub engine_config: Option<PathBuf>,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8092,
            engine_config: None,
            rate_limit_per_minute: 60,
            request_timeout_secs: 60,
            cors_allowed_origins: None,
        }
    }
}

fn parsed_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable values keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let engine_config = lookup("ENGINE_CONFIG")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS").map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        Self {
            port: parsed_or(lookup("PORT"), defaults.port),
            engine_config,
            rate_limit_per_minute: parsed_or(
                lookup("RATE_LIMIT_PER_MINUTE"),
                defaults.rate_limit_per_minute,
            ),
            request_timeout_secs: parsed_or(
                lookup("REQUEST_TIMEOUT_SECS"),
                defaults.request_timeout_secs,
            ),
            cors_allowed_origins,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Interval after which one request of the rate-limit quota is replenished.
    pub fn replenish_interval_ms(&self) -> u64 {
        (60_000 / u64::from(self.rate_limit_per_minute.max(1))).max(1)
    }
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
    fn test_defaults_when_unset() {
        let config = ServerConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_values_from_env() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("PORT", "9000"),
            ("ENGINE_CONFIG", "conf/engine.json"),
            ("RATE_LIMIT_PER_MINUTE", "120"),
            ("REQUEST_TIMEOUT_SECS", "5"),
            ("CORS_ALLOWED_ORIGINS", "http://a.test, http://b.test,"),
        ]));
        assert_eq!(config.port, 9000);
        assert_eq!(config.engine_config, Some(PathBuf::from("conf/engine.json")));
        assert_eq!(config.rate_limit_per_minute, 120);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(
            config.cors_allowed_origins,
            Some(vec!["http://a.test".to_string(), "http://b.test".to_string()])
        );
        assert_eq!(config.replenish_interval_ms(), 500);
    }

    #[test]
    fn test_unparsable_values_fall_back() {
        let config = ServerConfig::from_lookup(lookup_from(&[("PORT", "http"), ("ENGINE_CONFIG", " ")]));
        assert_eq!(config.port, 8092);
        assert_eq!(config.engine_config, None);
    }
}
