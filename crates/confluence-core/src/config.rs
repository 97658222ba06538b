//! Version manager configuration

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Version manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfluenceConfig {
    /// Label attached to tracing events from this manager
    pub name: String,
    /// Maximum nesting depth followed by adoption
    pub max_adoption_depth: usize,
}

impl ConfluenceConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With manager label
    #[inline]
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// With adoption depth limit
    #[inline]
    #[must_use]
    pub fn with_max_adoption_depth(mut self, depth: usize) -> Self {
        self.max_adoption_depth = depth;
        self
    }

    /// Parse from TOML, filling omitted keys with defaults
    ///
    /// # Errors
    /// Returns [`ConfluenceError::Config`](crate::ConfluenceError::Config)
    /// if the document is malformed
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }
}

impl Default for ConfluenceConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            max_adoption_depth: 256,
        }
    }
}
