//! Utility modules shared by the core and the server.

pub mod errors;
pub mod logger;

pub use errors::{AdminError, Result, Sentinel};
