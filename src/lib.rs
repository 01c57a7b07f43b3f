//! token-sessions - Session registry for cryptographic security tokens
//!
//! Tracks the open sessions of one token under stable integer handles,
//! counts read-write and read-only sessions, and keeps a single token-wide
//! login shared by every session.

pub mod audit;
pub mod cli;
pub mod config;
pub mod error;
pub mod scenario;
pub mod session;
pub mod token;

pub use error::{TokenError, TokenResult};
pub use session::{SessionContext, SessionFlags, SessionHandle, SessionState, UserType};
pub use token::{LoginState, Token};
