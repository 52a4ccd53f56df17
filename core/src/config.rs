//! Bridge configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::result::GlyphPolicy;

/// Configuration for [`ImeBridge`](crate::bridge::ImeBridge).
///
/// ```
/// # use imebridge_core::BridgeConfig;
/// let config = BridgeConfig::from_toml_str("show_default_ime_window = true").unwrap();
/// assert!(config.start_enabled);
/// assert!(config.show_default_ime_window);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Associate the input context as soon as the bridge is created.
    pub start_enabled: bool,
    /// Let the OS draw its own composition and candidate windows.
    /// Off in production, where the application renders everything.
    pub show_default_ime_window: bool,
    /// Substitution applied to committed text.
    pub glyphs: GlyphPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            start_enabled: true,
            show_default_ime_window: false,
            glyphs: GlyphPolicy::default(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file.
    pub fn load_toml<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Save configuration to a TOML file.
    pub fn save_toml<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Load configuration from TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Serialize configuration to TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
