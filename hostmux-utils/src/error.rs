//! Error types for hostmux
//!
//! Provides a unified error type used across all hostmux crates.

use std::path::PathBuf;
use std::time::Duration;

/// Main error type for hostmux operations
#[derive(Debug, thiserror::Error)]
pub enum HostmuxError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Connection Errors ===

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Connection closed")]
    ConnectionClosed,

    // === Protocol Errors ===

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Protocol version mismatch: expected {expected}, found {found}")]
    ProtocolMismatch { expected: u32, found: u32 },

    // === Request Errors ===

    #[error("Request {request} timed out after {timeout_ms}ms")]
    RequestTimeout { request: String, timeout_ms: u64 },

    #[error("Unexpected reply to {request}: {reply}")]
    UnexpectedReply { request: String, reply: String },

    // === Configuration Errors ===

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HostmuxError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a request timeout error
    pub fn request_timeout(request: impl Into<String>, timeout: Duration) -> Self {
        Self::RequestTimeout {
            request: request.into(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::RequestTimeout { .. }
        )
    }

    /// Check if this error means the connection is gone for good
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }
}

/// Result type alias using HostmuxError
pub type Result<T> = std::result::Result<T, HostmuxError>;
