//! Configuration schema for token-sessions
//!
//! Configuration is stored at `~/.config/token-sessions/config.toml`

use crate::session::MAX_SESSIONS;
use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Token settings
    pub token: TokenConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Enable audit logging
    pub audit_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            audit_log: true,
        }
    }
}

/// Token settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Token label
    pub label: String,

    /// Session handles available for the token's lifetime
    pub max_sessions: usize,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            label: "token".to_string(),
            max_sessions: MAX_SESSIONS,
        }
    }
}

impl Config {
    /// Check values serde cannot
    pub fn validate(&self) -> Result<(), String> {
        if self.token.max_sessions == 0 {
            return Err("token.max_sessions must be at least 1".to_string());
        }
        if !matches!(self.general.log_format.as_str(), "text" | "json") {
            return Err(format!(
                "general.log_format must be \"text\" or \"json\", got \"{}\"",
                self.general.log_format
            ));
        }
        Ok(())
    }
}
