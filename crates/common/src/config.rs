use std::time::Duration;

use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Address the HTTP server binds to
    pub host: String,

    /// Port the HTTP server binds to
    pub port: u16,

    /// Prefix for generated short URLs (e.g. `https://lnk.example`).
    /// When unset, the prefix is derived from the request `Host` header.
    pub public_base_url: Option<String>,

    /// Push-channel delivery settings
    pub delivery: DeliveryConfig,

    /// Short code generation settings
    pub shortener: ShortenerConfig,
}

/// Timing and buffering for the broadcast-delivery engine.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Scheduler tick period; also the step of the retry-due rule (default: 5000)
    pub retry_interval_ms: u64,

    /// Age after which an unacknowledged delivery is dropped (default: 30000)
    pub expiry_ms: u64,

    /// Outbound frames queued per connection before sends start failing (default: 64)
    pub connection_buffer: usize,
}

impl DeliveryConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn expiry(&self) -> Duration {
        Duration::from_millis(self.expiry_ms)
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: 5_000,
            expiry_ms: 30_000,
            connection_buffer: 64,
        }
    }
}

/// Short code generation parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ShortenerConfig {
    /// Number of alphanumeric characters in a generated code (default: 5)
    pub code_length: usize,

    /// Collisions tolerated before giving up on a request (default: 10)
    pub max_attempts: u32,
}

impl Default for ShortenerConfig {
    fn default() -> Self {
        Self {
            code_length: 5,
            max_attempts: 10,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let delivery_defaults = DeliveryConfig::default();
        let shortener_defaults = ShortenerConfig::default();

        let config = Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 3000)?,
            public_base_url: lookup("PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            delivery: DeliveryConfig {
                retry_interval_ms: parse_or(
                    &lookup,
                    "DELIVERY_RETRY_INTERVAL_MS",
                    delivery_defaults.retry_interval_ms,
                )?,
                expiry_ms: parse_or(
                    &lookup,
                    "DELIVERY_EXPIRY_MS",
                    delivery_defaults.expiry_ms,
                )?,
                connection_buffer: parse_or(
                    &lookup,
                    "DELIVERY_CONNECTION_BUFFER",
                    delivery_defaults.connection_buffer,
                )?,
            },
            shortener: ShortenerConfig {
                code_length: parse_or(
                    &lookup,
                    "SHORT_CODE_LENGTH",
                    shortener_defaults.code_length,
                )?,
                max_attempts: parse_or(
                    &lookup,
                    "SHORT_CODE_MAX_ATTEMPTS",
                    shortener_defaults.max_attempts,
                )?,
            },
        };

        if config.delivery.retry_interval_ms == 0 {
            anyhow::bail!("DELIVERY_RETRY_INTERVAL_MS must be greater than zero");
        }
        if config.delivery.connection_buffer == 0 {
            anyhow::bail!("DELIVERY_CONNECTION_BUFFER must be greater than zero");
        }
        if config.shortener.code_length == 0 {
            anyhow::bail!("SHORT_CODE_LENGTH must be greater than zero");
        }

        Ok(config)
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> anyhow::Result<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid {}", key, std::any::type_name::<T>())),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert!(config.public_base_url.is_none());
        assert_eq!(config.delivery.retry_interval(), Duration::from_secs(5));
        assert_eq!(config.delivery.expiry(), Duration::from_secs(30));
        assert_eq!(config.delivery.connection_buffer, 64);
        assert_eq!(config.shortener.code_length, 5);
        assert_eq!(config.shortener.max_attempts, 10);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("PORT", "8080"),
            ("PUBLIC_BASE_URL", "https://lnk.example/"),
            ("DELIVERY_RETRY_INTERVAL_MS", "1000"),
            ("SHORT_CODE_LENGTH", "7"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.public_base_url.as_deref(), Some("https://lnk.example"));
        assert_eq!(config.delivery.retry_interval_ms, 1000);
        assert_eq!(config.shortener.code_length, 7);
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = load(&[("PORT", "not-a-port")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        assert!(load(&[("DELIVERY_RETRY_INTERVAL_MS", "0")]).is_err());
    }
}
