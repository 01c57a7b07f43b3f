//! Reference session context
//!
//! Tracks the PKCS#11 session state machine and nothing else: no crypto
//! operation buffers, no object search state.

use crate::error::TokenResult;
use crate::session::context::{SessionContext, SessionFlags, SessionState, TokenInfo, UserType};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// Session record
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    /// Unique session ID, used in audit records
    pub id: Uuid,

    /// Label of the token the session was opened against
    pub token_label: String,

    /// Flags the session was opened with
    pub flags: SessionFlags,

    /// Current state
    pub state: SessionState,

    /// When the session was opened
    pub opened_at: DateTime<Utc>,

    /// Number of login/logout notifications received
    pub events_seen: u64,
}

impl Session {
    /// Create a new session in the state implied by `flags` and `login`
    pub fn new(token_label: String, flags: SessionFlags, login: Option<UserType>) -> Self {
        Self {
            id: Uuid::new_v4(),
            token_label,
            flags,
            state: SessionState::for_login(flags.is_rw(), login),
            opened_at: Utc::now(),
            events_seen: 0,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        !matches!(self.state, SessionState::RoPublic | SessionState::RwPublic)
    }
}

impl SessionContext for Session {
    fn open(token: &TokenInfo, flags: SessionFlags, login: Option<UserType>) -> TokenResult<Self> {
        Ok(Self::new(token.label.clone(), flags, login))
    }

    fn state(&self) -> SessionState {
        self.state
    }

    fn token_logout(&mut self) -> TokenResult<()> {
        self.state = SessionState::for_login(self.flags.is_rw(), None);
        debug!("Session {} performed token logout", self.id);
        Ok(())
    }

    fn login_event(&mut self, user: UserType, take_lock: bool) {
        self.events_seen += 1;
        // Context-specific login re-authenticates one operation only.
        if user == UserType::ContextSpecific {
            return;
        }
        self.state = SessionState::for_login(self.flags.is_rw(), Some(user));
        debug!(
            "Session {} saw {} login (locked by notifier: {}), now {}",
            self.id, user, take_lock, self.state
        );
    }

    fn logout_event(&mut self, take_lock: bool) {
        self.events_seen += 1;
        self.state = SessionState::for_login(self.flags.is_rw(), None);
        debug!(
            "Session {} saw logout (locked by notifier: {}), now {}",
            self.id, take_lock, self.state
        );
    }
}
