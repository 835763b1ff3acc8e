//! # Sailwatch Core
//!
//! Shared data model, configuration, and error taxonomy for the
//! sailwatch workspace.
//!
//! ## Architecture
//! ```text
//! CLI / daemon
//!   ├── sailwatch-api     — token cache + availability poller
//!   ├── sailwatch-daemon  — state store, supervisor, workflow runner
//!   └── sailwatch-core    — PollRequest, SailingRecord, WorkflowState,
//!                           ResultRecord, config, errors (this crate)
//! ```

pub mod config;
pub mod error;
pub mod types;

pub use config::{ApiConfig, BookingConfig, MonitorConfig, SailwatchConfig};
pub use error::{Result, SailwatchError};
pub use types::{
    PollRequest, ResultRecord, ResultStage, SailingRecord, SailingStatus, WorkflowState,
    WorkflowStatus,
};
