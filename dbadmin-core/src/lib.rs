//! Database administration core
//!
//! Backup and restore orchestration for a managed database engine, together
//! with the collaborators it drives: the engine's lifecycle tools, its SQL
//! shell and its structural checker.

pub mod admin;
pub mod backup;
pub mod catalog;
pub mod config;
pub mod control;
pub mod lookup;
pub mod process;
pub mod report;
pub mod restore;
pub mod session;
pub mod units;
pub mod utils;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::ToolConfig;
pub use utils::errors::AdminError;
pub use utils::errors::Result;
