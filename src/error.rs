//! Crate-level error type
//!
//! Each stage of a cycle has its own error; they all funnel into [`Error`] so
//! the benchmark loop can report which stage failed.

use crate::tls::{ContextError, HandshakeError};

/// Result type for harness operations
pub type Result<T> = std::result::Result<T, Error>;

/// Harness errors, one variant per stage
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(#[from] crate::net::Error),

    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Transfer error: {0}")]
    Transfer(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Short name of the stage that failed
    pub fn stage(&self) -> &'static str {
        match self {
            Error::Transport(_) => "transport",
            Error::Context(_) => "context",
            Error::Session(_) => "session",
            Error::Handshake(_) => "handshake",
            Error::Transfer(_) => "transfer",
            Error::Config(_) => "config",
        }
    }
}
