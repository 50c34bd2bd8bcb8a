//! Configuration for named caches
//!
//! Every dimension is optional; `None` means unbounded for that dimension.
//! Caches never own their configuration: they hold a [`ConfigSupplier`] and
//! re-read it when built, rebuilt and listed, so limits can change at runtime.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Zero-argument accessor returning the current configuration of a cache
pub type ConfigSupplier = Arc<dyn Fn() -> CacheConfig + Send + Sync>;

/// Build a supplier that always returns the same configuration
pub fn fixed(config: CacheConfig) -> ConfigSupplier {
    Arc::new(move || config.clone())
}

/// Configuration for a single named cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Maximum number of live entries before least recently used eviction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_size: Option<u64>,

    /// Entries become unavailable this long after they were written
    #[serde(with = "serde_duration::option", skip_serializing_if = "Option::is_none")]
    pub expire_after_write: Option<Duration>,

    /// Entries become unavailable this long after they were last read
    #[serde(with = "serde_duration::option", skip_serializing_if = "Option::is_none")]
    pub expire_after_access: Option<Duration>,

    /// Loading caches reload entries older than this in the background
    #[serde(with = "serde_duration::option", skip_serializing_if = "Option::is_none")]
    pub refresh_after_write: Option<Duration>,
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Configuration with no size or time limits
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.maximum_size == Some(0) {
            return Err("maximumSize must be greater than 0".to_string());
        }

        let durations = [
            ("expireAfterWrite", self.expire_after_write),
            ("expireAfterAccess", self.expire_after_access),
            ("refreshAfterWrite", self.refresh_after_write),
        ];
        for (field, value) in durations {
            if value == Some(Duration::ZERO) {
                return Err(format!("{} must be greater than 0", field));
            }
        }

        Ok(())
    }

    /// Whether any time-based expiry is configured
    pub fn has_expiry(&self) -> bool {
        self.expire_after_write.is_some() || self.expire_after_access.is_some()
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    /// Set the maximum number of entries
    pub fn maximum_size(mut self, size: u64) -> Self {
        self.config.maximum_size = Some(size);
        self
    }

    /// Expire entries a fixed time after they are written
    pub fn expire_after_write(mut self, ttl: Duration) -> Self {
        self.config.expire_after_write = Some(ttl);
        self
    }

    /// Expire entries a fixed time after they were last read
    pub fn expire_after_access(mut self, ttl: Duration) -> Self {
        self.config.expire_after_access = Some(ttl);
        self
    }

    /// Refresh loaded entries in the background once they reach this age
    pub fn refresh_after_write(mut self, interval: Duration) -> Self {
        self.config.refresh_after_write = Some(interval);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        self.config
    }
}

/// Serde support for durations written as `"10m"`, `"1h 30m"`, `"250ms"`
pub mod serde_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }

    /// Same format for optional durations
    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(duration) => super::serialize(duration, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            let raw: Option<String> = Option::deserialize(deserializer)?;
            raw.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_unbounded() {
        let config = CacheConfig::default();
        assert_eq!(config, CacheConfig::unbounded());
        assert!(config.maximum_size.is_none());
        assert!(!config.has_expiry());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let invalid = CacheConfig::builder().maximum_size(0).build();
        assert!(invalid.validate().is_err());

        let invalid = CacheConfig::builder()
            .expire_after_access(Duration::ZERO)
            .build();
        let message = invalid.validate().unwrap_err();
        assert!(message.contains("expireAfterAccess"));

        let valid = CacheConfig::builder()
            .maximum_size(1)
            .expire_after_write(Duration::from_millis(1))
            .build();
        assert!(valid.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::builder()
            .maximum_size(1000)
            .expire_after_write(Duration::from_secs(600))
            .refresh_after_write(Duration::from_secs(60))
            .build();

        assert_eq!(config.maximum_size, Some(1000));
        assert_eq!(config.expire_after_write, Some(Duration::from_secs(600)));
        assert_eq!(config.refresh_after_write, Some(Duration::from_secs(60)));
        assert!(config.expire_after_access.is_none());
        assert!(config.has_expiry());
    }

    #[test]
    fn test_fixed_supplier() {
        let config = CacheConfig::builder().maximum_size(5).build();
        let supplier = fixed(config.clone());
        assert_eq!(supplier(), config);
        assert_eq!(supplier(), config);
    }

    #[test]
    fn test_humanised_durations() {
        let json = r#"{"maximumSize": 100, "expireAfterWrite": "10m", "expireAfterAccess": "250ms"}"#;
        let config: CacheConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.maximum_size, Some(100));
        assert_eq!(config.expire_after_write, Some(Duration::from_secs(600)));
        assert_eq!(config.expire_after_access, Some(Duration::from_millis(250)));
        assert!(config.refresh_after_write.is_none());

        let written = serde_json::to_value(&config).unwrap();
        assert_eq!(written["expireAfterWrite"], "10m");
        assert!(written.get("refreshAfterWrite").is_none());
    }

    #[test]
    fn test_bad_duration_is_rejected() {
        let json = r#"{"expireAfterWrite": "ten minutes"}"#;
        assert!(serde_json::from_str::<CacheConfig>(json).is_err());
    }
}
