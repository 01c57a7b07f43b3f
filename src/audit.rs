//! Audit logging for token security events
//!
//! Writes JSON lines to `<state dir>/token-sessions/audit.log`.
//! On by default; disable with `general.audit_log = false`.

use crate::config::{schema::Config, ConfigManager};
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// File-based audit logger that appends JSON lines
#[derive(Debug, Clone)]
pub struct AuditLog {
    enabled: bool,
    path: PathBuf,
}

impl AuditLog {
    /// Create a new audit logger from config
    pub fn new(config: &Config) -> Self {
        Self {
            enabled: config.general.audit_log,
            path: ConfigManager::audit_log_path(),
        }
    }

    /// Create an enabled audit logger writing to `path`
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            enabled: true,
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Log an audit event as a JSON line
    ///
    /// IO failures are logged and dropped; they never fail the token
    /// operation that produced the event.
    pub fn log(&self, event: &str, data: &serde_json::Value) {
        if !self.enabled {
            return;
        }

        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": event,
            "data": data,
        });

        let mut line = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize audit event: {}", e);
                return;
            }
        };
        line.push('\n');

        if let Err(e) = self.append(&line) {
            warn!("Failed to write audit log: {}", e);
        }
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.write_all(line.as_bytes())?;
        file.flush()
    }
}
