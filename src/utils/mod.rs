//! Shared utilities: file IO, logging and statistics

pub mod io;
pub mod logging;
pub mod stats;
