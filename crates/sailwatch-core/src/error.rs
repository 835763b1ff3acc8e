//! Error taxonomy for the sailwatch workspace.
//!
//! Only `Argument` and `AlreadyRunning` may abort before any observable
//! state exists. Everything after a run starts is captured into the
//! workflow state and result record instead of killing the process.
//! A monitoring timeout is a normal outcome, not an error, and has no
//! variant here.

use thiserror::Error;

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, SailwatchError>;

#[derive(Debug, Error)]
pub enum SailwatchError {
    /// Invalid or missing configuration/arguments. Fatal before any run state exists.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// Token exchange failed. Surfaced as a poll-check error; the loop continues.
    #[error("token exchange failed: {0}")]
    Auth(String),

    /// A single request rejected as unauthorized (401-class). Triggers
    /// the one forced token refresh and retry; a second rejection
    /// surfaces as `Query` instead.
    #[error("unauthorized by availability source")]
    Unauthorized,

    /// A single network/parse failure. Logged; the poll loop is the retry mechanism.
    #[error("query failed: {0}")]
    Query(String),

    /// A live daemon already owns the pid record.
    #[error("daemon already running (pid {0})")]
    AlreadyRunning(u32),

    /// The daemon survived the forceful termination signal.
    #[error("daemon did not stop (pid {0})")]
    StopFailed(u32),

    /// Rejected workflow state transition.
    #[error("illegal state transition: {from} → {to}")]
    Transition { from: String, to: String },

    /// State store read/write problem.
    #[error("state store: {0}")]
    Store(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SailwatchError {
    /// Shorthand for a transient query error.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Shorthand for an argument error.
    pub fn argument(msg: impl Into<String>) -> Self {
        Self::Argument(msg.into())
    }
}
