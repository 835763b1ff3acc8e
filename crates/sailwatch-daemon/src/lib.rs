//! # Sailwatch Daemon
//!
//! Durable, cross-process-visible run state plus the process lifecycle
//! around it: a file-backed state store with atomic-replace writes, a
//! supervisor that detaches/probes/stops the background run, the
//! booking automator contract, and the workflow state machine that
//! glues monitoring to booking.
//!
//! ## Architecture
//! ```text
//! sailwatch monitor-and-book --daemon
//!   └── DaemonSupervisor.start → detached child (same binary)
//!         └── WorkflowRunner.execute
//!               ├── AvailabilityPoller.wait_for_availability
//!               ├── BookingAutomator steps (stop at first failure)
//!               └── StateStore: state.json / result.json / daemon.pid / daemon.log
//! sailwatch status | logs | stop — read the same store from any process
//! ```

pub mod booking;
pub mod store;
pub mod supervisor;
pub mod workflow;

pub use booking::{BOOKING_STEPS, BookingAutomator, CommandAutomator, StepResult};
pub use store::StateStore;
pub use supervisor::{DaemonStatus, DaemonSupervisor};
pub use workflow::WorkflowRunner;
