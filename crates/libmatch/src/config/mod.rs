use std::time::Duration;

use crate::{
    error::LibMatchError,
    search::{DEFAULT_NEARBY_RADIUS_KM, DEFAULT_STRATEGY_LIMIT},
};

/// Settings for a [`crate::LibraryRegistry`].
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    /// Abbreviation of the nation assumed by coverage that names none.
    pub default_nation: Option<String>,
    /// Results kept from each search strategy.
    pub strategy_limit: usize,
    /// Radius used by `nearby` when the caller gives none.
    pub nearby_radius_km: f64,
    /// Consult the geocode oracle for cities missing from the place store.
    pub use_external_source: bool,
    /// How long a single oracle call may take.
    pub external_source_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_nation: None,
            strategy_limit: DEFAULT_STRATEGY_LIMIT,
            nearby_radius_km: DEFAULT_NEARBY_RADIUS_KM,
            use_external_source: true,
            external_source_timeout: Duration::from_secs(5),
        }
    }
}

/// Builder for creating registry configurations with ergonomic defaults
#[derive(Debug, Clone, Default)]
pub struct RegistryConfigBuilder {
    config: RegistryConfig,
}

impl RegistryConfigBuilder {
    /// Create a new builder with sensible defaults
    pub fn new() -> Self {
        Self {
            config: RegistryConfig::default(),
        }
    }

    /// Only what the place store knows, and fewer results per strategy
    pub fn strict() -> Self {
        let mut builder = Self::new();
        builder.config.use_external_source = false;
        builder.config.strategy_limit = 5;
        builder
    }

    /// Wider searches and more patience with the geocode oracle
    pub fn permissive() -> Self {
        let mut builder = Self::new();
        builder.config.strategy_limit = 20;
        builder.config.nearby_radius_km = 300.0;
        builder.config.external_source_timeout = Duration::from_secs(15);
        builder
    }

    /// Set the nation assumed when coverage names none, e.g. "US"
    pub fn default_nation(mut self, abbreviation: impl Into<String>) -> Self {
        self.config.default_nation = Some(abbreviation.into());
        self
    }

    /// Set the maximum number of results kept from each search strategy
    pub fn strategy_limit(mut self, limit: usize) -> Self {
        self.config.strategy_limit = limit;
        self
    }

    pub fn nearby_radius_km(mut self, radius: f64) -> Self {
        self.config.nearby_radius_km = radius;
        self
    }

    /// Enable or disable the geocode oracle fallback
    pub fn external_source(mut self, enabled: bool) -> Self {
        self.config.use_external_source = enabled;
        self
    }

    pub fn external_source_timeout(mut self, timeout: Duration) -> Self {
        self.config.external_source_timeout = timeout;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> RegistryConfig {
        self.config
    }

    /// Build the final configuration, rejecting values no search can use
    pub fn try_build(self) -> Result<RegistryConfig, LibMatchError> {
        let config = self.config;
        if config.strategy_limit == 0 {
            return Err(LibMatchError::ConfigError(
                "strategy_limit must be at least 1".to_string(),
            ));
        }
        if !config.nearby_radius_km.is_finite() || config.nearby_radius_km <= 0.0 {
            return Err(LibMatchError::ConfigError(format!(
                "nearby_radius_km must be a positive number of kilometers, got {}",
                config.nearby_radius_km
            )));
        }
        if config.external_source_timeout.is_zero() {
            return Err(LibMatchError::ConfigError(
                "external_source_timeout must be longer than zero".to_string(),
            ));
        }
        Ok(config)
    }
}
