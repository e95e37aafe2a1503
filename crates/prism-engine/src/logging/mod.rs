//! Logging utilities.
//!
//! This module centralizes logger initialization. The engine itself only
//! emits through the `log` facade; hosts decide whether to install
//! `env_logger` via [`init_logging`].

mod init;

pub use init::{init_logging, LoggingConfig, DEFAULT_FILTER};
