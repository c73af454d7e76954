//! hostmux-utils: Common utilities shared across hostmux crates
//!
//! This crate provides:
//! - Unified error types ([`HostmuxError`], [`Result`])
//! - Logging infrastructure ([`init_logging`], [`LogConfig`])
//! - XDG-compliant path utilities ([`paths`] module)

pub mod error;
pub mod logging;
pub mod paths;

// Re-export main types at crate root for convenience
pub use error::{HostmuxError, Result};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogOutput, LOG_ENV};
pub use paths::{config_dir, config_file, ensure_dir, log_dir, state_dir};
