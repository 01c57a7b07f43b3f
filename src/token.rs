//! Token: session table plus token-wide login state
//!
//! At most one user is logged in per token, shared by every session. The
//! token records which session performed the login by handle only; the
//! table keeps ownership of that session's context.

use crate::audit::AuditLog;
use crate::config::schema::TokenConfig;
use crate::error::{TokenError, TokenResult};
use crate::session::{
    Session, SessionContext, SessionCounts, SessionFlags, SessionGuard, SessionHandle,
    SessionTable, TokenInfo, UserType,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

/// Token-wide login state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoginState {
    /// Logged in user type, `None` when no one is logged in
    pub user: Option<UserType>,
    /// Session that performed the login, set iff `user` is
    pub session: Option<SessionHandle>,
}

impl LoginState {
    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }
}

/// A token with its open sessions
pub struct Token<S: SessionContext = Session> {
    info: TokenInfo,
    sessions: SessionTable<S>,
    login: Mutex<LoginState>,
    audit: Option<AuditLog>,
}

impl<S: SessionContext> Token<S> {
    /// Open a token with room for `max_sessions` session handles
    pub fn new(info: TokenInfo, max_sessions: usize) -> TokenResult<Self> {
        let sessions = SessionTable::new(max_sessions)?;
        info!("Opened token {} ({} session slots)", info.label, max_sessions);

        Ok(Self {
            info,
            sessions,
            login: Mutex::new(LoginState::default()),
            audit: None,
        })
    }

    /// Open a token from its configuration section
    pub fn from_config(config: &TokenConfig) -> TokenResult<Self> {
        Self::new(TokenInfo::new(config.label.clone()), config.max_sessions)
    }

    /// Record security events to `audit`
    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn info(&self) -> &TokenInfo {
        &self.info
    }

    pub fn sessions(&self) -> &SessionTable<S> {
        &self.sessions
    }

    pub fn login_state(&self) -> LoginState {
        *self.login.lock()
    }

    pub fn counts(&self) -> SessionCounts {
        self.sessions.counts()
    }

    /// Open a new session
    pub fn open_session(&self, flags: SessionFlags) -> TokenResult<SessionHandle> {
        if !flags.is_serial() {
            return Err(TokenError::SessionParallelNotSupported);
        }

        let mut table = self.sessions.lock();
        let user = self.login.lock().user;
        if user == Some(UserType::So) && !flags.is_rw() {
            return Err(TokenError::SessionReadWriteSoExists);
        }

        let handle = table.new_session(&self.info, flags, user)?;
        let counts = table.counts();
        drop(table);

        info!(
            "Opened {} session {} on token {}",
            if flags.is_rw() { "rw" } else { "ro" },
            handle,
            self.info.label
        );
        self.audit(
            "session.opened",
            json!({ "token": self.info.label, "handle": handle, "rw": flags.is_rw(), "counts": counts }),
        );
        Ok(handle)
    }

    /// Close one session
    ///
    /// Closing the last session logs out any logged in user.
    pub fn close_session(&self, handle: SessionHandle) -> TokenResult<()> {
        // Login state only changes under the table lock.
        let mut table = self.sessions.lock();
        let was_logged_in = self.login_state().is_logged_in();
        table.close_by_handle(&self.login, handle)?;
        let cascaded = was_logged_in && !self.login_state().is_logged_in();
        drop(table);

        info!("Closed session {} on token {}", handle, self.info.label);
        self.audit(
            "session.closed",
            json!({ "token": self.info.label, "handle": handle }),
        );
        self.audit_cascade(cascaded);
        Ok(())
    }

    /// Close every open session
    pub fn close_all_sessions(&self) {
        let mut table = self.sessions.lock();
        let was_logged_in = self.login_state().is_logged_in();
        table.close_all(&self.login);
        let cascaded = was_logged_in && !self.login_state().is_logged_in();
        drop(table);

        info!("Closed all sessions on token {}", self.info.label);
        self.audit(
            "token.sessions.closed_all",
            json!({ "token": self.info.label }),
        );
        self.audit_cascade(cascaded);
    }

    /// Look up an open session, returned locked
    pub fn session(&self, handle: SessionHandle) -> TokenResult<SessionGuard<S>> {
        self.sessions.lookup(handle)
    }

    /// Log `user` in through session `handle`
    pub fn login(&self, handle: SessionHandle, user: UserType) -> TokenResult<()> {
        let table = self.sessions.lock();
        let mut session = table.lock_session(handle)?;
        let current = *self.login.lock();

        match (current.user, user) {
            (None, UserType::ContextSpecific) => return Err(TokenError::UserNotLoggedIn),
            (Some(_), UserType::ContextSpecific) => {
                // Re-authentication concerns the calling session only.
                session.login_event(user, false);
                debug!("Context-specific login on session {}", handle);
                return Ok(());
            }
            (Some(logged_in), _) if logged_in == user => {
                return Err(TokenError::UserAlreadyLoggedIn)
            }
            (Some(_), _) => return Err(TokenError::UserAnotherAlreadyLoggedIn),
            (None, UserType::So) if table.counts().ro > 0 => {
                return Err(TokenError::SessionReadOnlyExists)
            }
            (None, _) => {}
        }

        *self.login.lock() = LoginState {
            user: Some(user),
            session: Some(handle),
        };
        table.broadcast_login(user, Some(&mut session));
        drop(session);
        drop(table);

        info!("{} logged in on token {} through session {}", user, self.info.label, handle);
        self.audit(
            "token.login",
            json!({
                "token": self.info.label,
                "handle": handle,
                "user": user,
                "ck_user": user.ck_user_type(),
            }),
        );
        Ok(())
    }

    /// Log the current user out through session `handle`
    pub fn logout(&self, handle: SessionHandle) -> TokenResult<()> {
        let mut table = self.sessions.lock();
        let mut session = table.lock_session(handle)?;
        let Some(user) = self.login.lock().user else {
            return Err(TokenError::UserNotLoggedIn);
        };

        session.token_logout()?;
        *self.login.lock() = LoginState::default();
        table.broadcast_logout(Some(&mut session));
        drop(session);
        table.release_retained_login();
        drop(table);

        info!("{} logged out of token {} through session {}", user, self.info.label, handle);
        self.audit(
            "token.logout",
            json!({ "token": self.info.label, "handle": handle, "user": user }),
        );
        Ok(())
    }

    fn audit_cascade(&self, cascaded: bool) {
        if cascaded {
            self.audit("token.logout.cascade", json!({ "token": self.info.label }));
        }
    }

    fn audit(&self, event: &str, data: serde_json::Value) {
        if let Some(audit) = &self.audit {
            audit.log(event, &data);
        }
    }
}

impl<S: SessionContext> Drop for Token<S> {
    fn drop(&mut self) {
        self.sessions.close_all(&self.login);
        debug!("Closed token {}", self.info.label);
    }
}
