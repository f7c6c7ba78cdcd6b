//! Configuration and logging helpers

mod config;
mod logging;

pub use config::*;
pub use logging::*;
