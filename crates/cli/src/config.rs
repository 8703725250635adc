//! Configuration file loading
//!
//! ```toml
//! [session]
//! api_key = "..."
//! user_id = "1"
//! token = "..."
//! call_id = "living-room"
//!
//! [lifecycle]
//! require_charging = true
//!
//! [logging]
//! level = "debug"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use voicebox_presence_core::{LifecyclePolicy, SessionConfig};

use crate::logging::LoggingConfig;

const CONFIG_DIR: &str = "voicebox";
const REDACTED: &str = "<redacted>";
const CONFIG_FILE: &str = "config.toml";

/// Everything the CLI reads from its configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub session: SessionConfig,
    pub lifecycle: LifecyclePolicy,
    pub logging: LoggingConfig,
}

impl CliConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid configuration file")
    }

    /// Load from `path`, or from the default location if it exists
    ///
    /// A missing default file yields the default configuration; a missing
    /// explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Failed to load {}", path.display()))
    }

    /// Copy with secrets masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for secret in [&mut copy.session.api_key, &mut copy.session.token] {
            if !secret.is_empty() {
                *secret = REDACTED.to_string();
            }
        }
        copy
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration")
    }
}

/// `<config dir>/voicebox/config.toml`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}
