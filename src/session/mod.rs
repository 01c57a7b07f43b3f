//! Session registry module

pub mod context;
pub mod state;
pub mod table;

pub use context::{SessionContext, SessionFlags, SessionHandle, SessionState, TokenInfo, UserType};
pub use state::Session;
pub use table::{SessionCounts, SessionGuard, SessionTable, TableGuard, MAX_SESSIONS};
