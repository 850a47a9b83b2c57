//! Configuration types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// On-device cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalCacheConfig {
    /// Directory holding the LMDB environment
    pub path: PathBuf,
    /// Maximum map size in megabytes
    pub max_size_mb: usize,
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".lectio/cache"),
            max_size_mb: 64,
        }
    }
}

/// Shared remote datastore (PostgREST endpoint) settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteStoreConfig {
    /// Project base URL, e.g. `https://project.supabase.co`
    pub base_url: String,
    /// Anon/service key sent as `apikey` and bearer token
    pub api_key: String,
    /// Table holding commentary rows
    pub table: String,
    /// Per-request timeout
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for RemoteStoreConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            table: "commentaries".to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

impl fmt::Debug for RemoteStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStoreConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("table", &self.table)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Generative commentary service settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Full URL of the generation endpoint
    pub endpoint: String,
    /// Optional bearer token
    pub api_key: Option<String>,
    /// Maximum requests per minute
    pub requests_per_minute: u32,
    /// Transport-level timeout for one generation call
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            requests_per_minute: 30,
            timeout: Duration::from_secs(60),
        }
    }
}

impl fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("requests_per_minute", &self.requests_per_minute)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Master configuration struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LectioConfig {
    pub local: LocalCacheConfig,
    pub remote: RemoteStoreConfig,
    pub generator: GeneratorConfig,
}

impl LectioConfig {
    /// Build configuration from `LECTIO_*` environment variables.
    ///
    /// Unset or unparsable values fall back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parsed = |name: &str| lookup(name).and_then(|s| s.trim().parse::<u64>().ok());

        Self {
            local: LocalCacheConfig {
                path: lookup("LECTIO_CACHE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.local.path),
                max_size_mb: parsed("LECTIO_CACHE_MAX_MB")
                    .map(|v| v as usize)
                    .unwrap_or(defaults.local.max_size_mb),
            },
            remote: RemoteStoreConfig {
                base_url: lookup("LECTIO_REMOTE_URL").unwrap_or(defaults.remote.base_url),
                api_key: lookup("LECTIO_REMOTE_KEY").unwrap_or(defaults.remote.api_key),
                table: lookup("LECTIO_REMOTE_TABLE").unwrap_or(defaults.remote.table),
                timeout: parsed("LECTIO_REMOTE_TIMEOUT")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.remote.timeout),
            },
            generator: GeneratorConfig {
                endpoint: lookup("LECTIO_GENERATOR_URL").unwrap_or(defaults.generator.endpoint),
                api_key: lookup("LECTIO_GENERATOR_KEY").or(defaults.generator.api_key),
                requests_per_minute: parsed("LECTIO_GENERATOR_RPM")
                    .map(|v| v as u32)
                    .unwrap_or(defaults.generator.requests_per_minute),
                timeout: parsed("LECTIO_GENERATOR_TIMEOUT")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.generator.timeout),
            },
        }
    }

    /// Parse configuration from TOML. Missing sections take defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    /// Check that the configuration can back a resolver.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote.base_url.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "remote.base_url".to_string(),
            });
        }
        if self.remote.table.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "remote.table".to_string(),
            });
        }
        if self.generator.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "generator.endpoint".to_string(),
            });
        }
        if self.generator.requests_per_minute == 0 {
            return Err(ConfigError::InvalidValue {
                field: "generator.requests_per_minute".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.local.max_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "local.max_size_mb".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
