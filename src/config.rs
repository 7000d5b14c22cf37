//! Construction-time limits for a [BoundedCache](crate::BoundedCache).
//!
//! Limits are fixed for the lifetime of a cache.  Build them either directly, with [CacheConfig::default], or through
//! the generated [CacheConfigBuilder], which fills in any limit left unset with the default.

/// Default maximum number of live entries.
pub const DEFAULT_COUNT_LIMIT: usize = 100;

/// Default maximum summed cost of live entries: 100 MiB when cost is measured in bytes.
pub const DEFAULT_TOTAL_COST_LIMIT: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, derive_builder::Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct CacheConfig {
    /// Maximum number of live entries.
    #[builder(default = "DEFAULT_COUNT_LIMIT")]
    pub count_limit: usize,
    /// Maximum summed cost of live entries.
    #[builder(default = "DEFAULT_TOTAL_COST_LIMIT")]
    pub total_cost_limit: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid cache configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<CacheConfigBuilderError> for ConfigError {
    fn from(e: CacheConfigBuilderError) -> ConfigError {
        ConfigError::InvalidConfiguration(e.to_string())
    }
}

const ZERO_COUNT_LIMIT: &str = "count_limit must be at least 1";
const ZERO_COST_LIMIT: &str = "total_cost_limit must be at least 1";

impl CacheConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.count_limit == Some(0) {
            return Err(ZERO_COUNT_LIMIT.to_string());
        }
        if self.total_cost_limit == Some(0) {
            return Err(ZERO_COST_LIMIT.to_string());
        }
        Ok(())
    }
}

impl CacheConfig {
    /// Check the limits.  The fields are public, so the cache re-checks whatever it is handed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.count_limit == 0 {
            return Err(ConfigError::InvalidConfiguration(
                ZERO_COUNT_LIMIT.to_string(),
            ));
        }
        if self.total_cost_limit == 0 {
            return Err(ConfigError::InvalidConfiguration(
                ZERO_COST_LIMIT.to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> CacheConfig {
        CacheConfig {
            count_limit: DEFAULT_COUNT_LIMIT,
            total_cost_limit: DEFAULT_TOTAL_COST_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let cfg = CacheConfigBuilder::default()
            .build()
            .expect("Defaults are valid");
        assert_eq!(cfg, CacheConfig::default());
        assert_eq!(cfg.count_limit, 100);
        assert_eq!(cfg.total_cost_limit, 104_857_600);

        let cfg = CacheConfigBuilder::default()
            .count_limit(2)
            .build()
            .expect("Should build");
        assert_eq!(cfg.count_limit, 2);
        assert_eq!(cfg.total_cost_limit, DEFAULT_TOTAL_COST_LIMIT);
    }

    #[test]
    fn test_zero_limits_are_rejected() {
        let err: ConfigError = CacheConfigBuilder::default()
            .count_limit(0)
            .build()
            .unwrap_err()
            .into();
        assert!(err.to_string().contains("count_limit"));

        let err: ConfigError = CacheConfigBuilder::default()
            .total_cost_limit(0)
            .build()
            .unwrap_err()
            .into();
        assert!(err.to_string().contains("total_cost_limit"));

        let direct = CacheConfig {
            count_limit: 5,
            total_cost_limit: 0,
        };
        assert_eq!(
            direct.validate(),
            Err(ConfigError::InvalidConfiguration(ZERO_COST_LIMIT.to_string()))
        );
    }
}
