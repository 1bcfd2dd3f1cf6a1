//! Engine configuration, loadable from TOML.
//!
//! ```toml
//! max_specializations = 500
//! literal_pendings = true
//! diagnostics = false
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading an [`EngineConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid engine configuration: {0}")]
    Invalid(#[from] toml::de::Error),
}

/// Options controlling one inference engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on distinct graph contexts. `None` means unbounded, in
    /// which case a signature that never stabilizes does not terminate.
    pub max_specializations: Option<usize>,
    /// Give numeric literals a pending dtype that adapts to their uses.
    pub literal_pendings: bool,
    /// Enable the thread-local diagnostics collector during `run`.
    pub diagnostics: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_specializations: None,
            literal_pendings: true,
            diagnostics: false,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn with_max_specializations(mut self, limit: usize) -> Self {
        self.max_specializations = Some(limit);
        self
    }
}
