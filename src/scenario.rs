//! Scripted token session scenarios
//!
//! A scenario is a TOML file with a `[[step]]` list, replayed in order
//! against one token:
//!
//! ```toml
//! [[step]]
//! op = "open"
//! rw = true
//!
//! [[step]]
//! op = "login"
//! handle = 0
//! user = "user"
//! ```

use crate::error::{rv, TokenError, TokenResult};
use crate::session::{SessionContext, SessionCounts, SessionFlags, SessionHandle, UserType};
use crate::token::{LoginState, Token};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// One scripted token operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Step {
    Open {
        #[serde(default)]
        rw: bool,
    },
    Close {
        handle: u64,
    },
    CloseAll,
    Login {
        handle: u64,
        user: UserType,
    },
    Logout {
        handle: u64,
    },
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { rw: true } => write!(f, "open rw"),
            Self::Open { rw: false } => write!(f, "open ro"),
            Self::Close { handle } => write!(f, "close {}", handle),
            Self::CloseAll => write!(f, "close-all"),
            Self::Login { handle, user } => write!(f, "login {} on {}", user, handle),
            Self::Logout { handle } => write!(f, "logout on {}", handle),
        }
    }
}

impl Step {
    /// Session the step addresses, if any
    fn handle(&self) -> Option<SessionHandle> {
        match *self {
            Self::Open { .. } | Self::CloseAll => None,
            Self::Close { handle } | Self::Login { handle, .. } | Self::Logout { handle } => {
                Some(SessionHandle(handle))
            }
        }
    }
}

/// A parsed scenario file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

/// Outcome of one replayed step
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub step: String,
    /// Handle assigned by an `open` step
    pub handle: Option<SessionHandle>,
    /// Error message when the step failed
    pub error: Option<String>,
    /// PKCS#11 return value of the step
    pub rv: u64,
    /// `CKS_*` state of the addressed session, if it is still open
    pub ck_state: Option<u64>,
    pub counts: SessionCounts,
    pub login: LoginState,
}

impl StepReport {
    pub fn ok(&self) -> bool {
        self.error.is_none()
    }
}

impl Scenario {
    /// Parse a scenario from TOML text
    pub fn parse(content: &str, path: &Path) -> TokenResult<Self> {
        toml::from_str(content).map_err(|e| TokenError::ScenarioInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Load a scenario file
    pub async fn load(path: &Path) -> TokenResult<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| TokenError::io(format!("reading scenario {}", path.display()), e))?;
        Self::parse(&content, path)
    }

    /// Replay every step against `token`
    ///
    /// Failed steps are reported and the replay continues, unless
    /// `fail_fast` is set.
    pub fn replay<S: SessionContext>(&self, token: &Token<S>, fail_fast: bool) -> Vec<StepReport> {
        let mut reports = Vec::with_capacity(self.steps.len());

        for (index, step) in self.steps.iter().enumerate() {
            let result = apply(token, step);
            debug!("Step {} ({}) -> {:?}", index, step, result);

            let (handle, error, code) = match result {
                Ok(handle) => (handle, None, rv::CKR_OK),
                Err(e) => (None, Some(e.to_string()), e.ck_rv()),
            };
            let failed = error.is_some();
            let ck_state = handle
                .or_else(|| step.handle())
                .and_then(|h| token.session(h).ok())
                .map(|session| session.state().ck_state());

            reports.push(StepReport {
                index,
                step: step.to_string(),
                handle,
                error,
                rv: code,
                ck_state,
                counts: token.counts(),
                login: token.login_state(),
            });

            if failed && fail_fast {
                break;
            }
        }

        reports
    }
}

fn apply<S: SessionContext>(token: &Token<S>, step: &Step) -> TokenResult<Option<SessionHandle>> {
    match *step {
        Step::Open { rw } => {
            let flags = if rw {
                SessionFlags::read_write()
            } else {
                SessionFlags::read_only()
            };
            token.open_session(flags).map(Some)
        }
        Step::Close { handle } => token.close_session(SessionHandle(handle)).map(|_| None),
        Step::CloseAll => {
            token.close_all_sessions();
            Ok(None)
        }
        Step::Login { handle, user } => token.login(SessionHandle(handle), user).map(|_| None),
        Step::Logout { handle } => token.logout(SessionHandle(handle)).map(|_| None),
    }
}
