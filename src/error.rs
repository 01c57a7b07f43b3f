//! Error types for token-sessions
//!
//! All recoverable failures surface as `TokenResult<T>`. Broken invariants
//! never do: they go through [`fatal`], which aborts the current thread.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for token-sessions operations
pub type TokenResult<T> = Result<T, TokenError>;

/// PKCS#11 return codes surfaced by this crate
pub mod rv {
    pub const CKR_OK: u64 = 0x0000_0000;
    pub const CKR_HOST_MEMORY: u64 = 0x0000_0002;
    pub const CKR_GENERAL_ERROR: u64 = 0x0000_0005;
    pub const CKR_SESSION_COUNT: u64 = 0x0000_00B1;
    pub const CKR_SESSION_HANDLE_INVALID: u64 = 0x0000_00B3;
    pub const CKR_SESSION_PARALLEL_NOT_SUPPORTED: u64 = 0x0000_00B4;
    pub const CKR_SESSION_READ_ONLY_EXISTS: u64 = 0x0000_00B7;
    pub const CKR_SESSION_READ_WRITE_SO_EXISTS: u64 = 0x0000_00B8;
    pub const CKR_USER_ALREADY_LOGGED_IN: u64 = 0x0000_0100;
    pub const CKR_USER_NOT_LOGGED_IN: u64 = 0x0000_0101;
    pub const CKR_USER_ANOTHER_ALREADY_LOGGED_IN: u64 = 0x0000_0104;
}

/// All errors that can occur in token-sessions
#[derive(Error, Debug)]
pub enum TokenError {
    // Token errors
    #[error("Out of host memory while allocating {0}")]
    HostMemory(&'static str),

    #[error("Invalid session handle: {0}")]
    SessionHandleInvalid(u64),

    #[error("Session handles exhausted: {capacity} handles already issued")]
    SessionCount { capacity: usize },

    #[error("Parallel sessions are not supported, CKF_SERIAL_SESSION must be set")]
    SessionParallelNotSupported,

    #[error("A read-only session exists, security officer cannot log in")]
    SessionReadOnlyExists,

    #[error("Security officer is logged in, read-only sessions cannot be opened")]
    SessionReadWriteSoExists,

    #[error("User is already logged in")]
    UserAlreadyLoggedIn,

    #[error("Another user is already logged in")]
    UserAnotherAlreadyLoggedIn,

    #[error("No user is logged in")]
    UserNotLoggedIn,

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid scenario {path}: {reason}")]
    ScenarioInvalid { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TokenError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// PKCS#11 return code for this error
    pub fn ck_rv(&self) -> u64 {
        match self {
            Self::HostMemory(_) => rv::CKR_HOST_MEMORY,
            Self::SessionHandleInvalid(_) => rv::CKR_SESSION_HANDLE_INVALID,
            Self::SessionCount { .. } => rv::CKR_SESSION_COUNT,
            Self::SessionParallelNotSupported => rv::CKR_SESSION_PARALLEL_NOT_SUPPORTED,
            Self::SessionReadOnlyExists => rv::CKR_SESSION_READ_ONLY_EXISTS,
            Self::SessionReadWriteSoExists => rv::CKR_SESSION_READ_WRITE_SO_EXISTS,
            Self::UserAlreadyLoggedIn => rv::CKR_USER_ALREADY_LOGGED_IN,
            Self::UserAnotherAlreadyLoggedIn => rv::CKR_USER_ANOTHER_ALREADY_LOGGED_IN,
            Self::UserNotLoggedIn => rv::CKR_USER_NOT_LOGGED_IN,
            _ => rv::CKR_GENERAL_ERROR,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::SessionCount { .. } => {
                Some("Handles are never reused; reopen the token or raise token.max_sessions")
            }
            Self::SessionParallelNotSupported => Some("Open the session with the serial flag set"),
            Self::SessionReadOnlyExists => Some("Close all read-only sessions before SO login"),
            Self::UserNotLoggedIn => Some("Log in on any open session first"),
            Self::ConfigInvalid { .. } => Some("Run: token-sessions config init --force"),
            _ => None,
        }
    }
}

/// Abort on corrupted shared state.
///
/// Continuing after a broken invariant risks a double release or two
/// concurrent logins, so this never returns.
#[track_caller]
pub fn fatal(msg: &str) -> ! {
    tracing::error!("fatal session table failure: {}", msg);
    panic!("fatal session table failure: {msg}");
}
