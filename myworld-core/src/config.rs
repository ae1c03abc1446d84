use crate::reference::MYWORLD;

/// Configuration shared by every view of a database
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Datasource assumed for two-segment URNs
    pub default_datasource: String,

    /// Number of URNs a read-only view caches before flushing
    pub readonly_cache_size: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            default_datasource: MYWORLD.to_string(),
            readonly_cache_size: 1000,
        }
    }
}

impl CoreConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_datasource(mut self, datasource: impl Into<String>) -> Self {
        self.default_datasource = datasource.into();
        self
    }

    pub fn with_readonly_cache_size(mut self, size: usize) -> Self {
        self.readonly_cache_size = size;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.default_datasource.is_empty() || self.default_datasource.contains('/') {
            return Err("default_datasource must be a non-empty name without '/'".to_string());
        }

        if self.readonly_cache_size == 0 {
            return Err("readonly_cache_size must be greater than 0".to_string());
        }

        Ok(())
    }
}
