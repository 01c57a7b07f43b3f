//! CLI command implementations

pub mod config;
pub mod run;
pub mod stress;

pub use config::execute as config;
pub use run::execute as run;
pub use stress::execute as stress;
