//! Logging setup and batch execution helpers.

pub mod batch;
pub mod logging;

pub use batch::run_isolated;
pub use logging::{init_from_env, init_logging, LoggingConfig};
