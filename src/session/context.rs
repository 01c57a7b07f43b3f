//! Session context capability
//!
//! The session table only ever talks to a session through this trait.
//! Locking is provided by the table: every context lives behind its own
//! mutex, nested under the table lock.

use crate::error::TokenResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable integer handle of an open session
///
/// Handles are slot indices and are never reused after close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(pub u64);

impl SessionHandle {
    /// Slot index for this handle
    pub fn index(self) -> usize {
        usize::try_from(self.0).unwrap_or(usize::MAX)
    }
}

impl From<usize> for SessionHandle {
    fn from(index: usize) -> Self {
        Self(index as u64)
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session open flags (`CK_FLAGS`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionFlags(pub u64);

impl SessionFlags {
    pub const RW_SESSION: u64 = 0x0000_0002;
    pub const SERIAL_SESSION: u64 = 0x0000_0004;

    /// Serial read-only session
    pub fn read_only() -> Self {
        Self(Self::SERIAL_SESSION)
    }

    /// Serial read-write session
    pub fn read_write() -> Self {
        Self(Self::SERIAL_SESSION | Self::RW_SESSION)
    }

    pub fn is_rw(self) -> bool {
        self.0 & Self::RW_SESSION != 0
    }

    pub fn is_serial(self) -> bool {
        self.0 & Self::SERIAL_SESSION != 0
    }
}

/// Token user types (`CK_USER_TYPE`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    /// Security officer
    So,
    /// Normal user
    User,
    /// Re-authentication for a single operation
    ContextSpecific,
}

impl UserType {
    /// PKCS#11 `CKU_*` value
    pub fn ck_user_type(self) -> u64 {
        match self {
            Self::So => 0,
            Self::User => 1,
            Self::ContextSpecific => 2,
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::So => "so",
            Self::User => "user",
            Self::ContextSpecific => "context-specific",
        };
        write!(f, "{}", name)
    }
}

/// Session states (`CK_STATE`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    RoPublic,
    RoUser,
    RwPublic,
    RwUser,
    RwSo,
}

impl SessionState {
    /// Whether this is one of the read-write variants
    pub fn is_rw(self) -> bool {
        matches!(self, Self::RwPublic | Self::RwUser | Self::RwSo)
    }

    /// PKCS#11 `CKS_*` value
    pub fn ck_state(self) -> u64 {
        match self {
            Self::RoPublic => 0,
            Self::RoUser => 1,
            Self::RwPublic => 2,
            Self::RwUser => 3,
            Self::RwSo => 4,
        }
    }

    /// State a session of the given class is in while `login` holds
    pub fn for_login(rw: bool, login: Option<UserType>) -> Self {
        match (rw, login) {
            (false, Some(UserType::User)) => Self::RoUser,
            (false, _) => Self::RoPublic,
            (true, Some(UserType::User)) => Self::RwUser,
            (true, Some(UserType::So)) => Self::RwSo,
            (true, _) => Self::RwPublic,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RoPublic => "ro-public",
            Self::RoUser => "ro-user",
            Self::RwPublic => "rw-public",
            Self::RwUser => "rw-user",
            Self::RwSo => "rw-so",
        };
        write!(f, "{}", name)
    }
}

/// Identity of the token a session is opened against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Human-readable token label
    pub label: String,
}

impl TokenInfo {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

/// Capability contract the session table requires from a session
///
/// Destruction is `Drop` of the table's owning reference. The
/// `take_lock` flag on notifications tells the context whether the
/// notifier had to acquire the context's lock for this call (`true`) or
/// whether the context is the one that triggered the transition and its
/// caller already held the lock (`false`).
pub trait SessionContext: Send + Sized + 'static {
    /// Construct a context for a new session
    fn open(token: &TokenInfo, flags: SessionFlags, login: Option<UserType>) -> TokenResult<Self>;

    /// Current session state
    fn state(&self) -> SessionState;

    /// Perform the token-wide logout through this session
    fn token_logout(&mut self) -> TokenResult<()>;

    /// A user logged in on the token
    fn login_event(&mut self, user: UserType, take_lock: bool);

    /// The token logged out
    fn logout_event(&mut self, take_lock: bool);
}
