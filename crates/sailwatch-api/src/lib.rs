//! # Sailwatch API
//!
//! Client side of the availability source: bearer token lifecycle,
//! authenticated sailing search, and the interval poll loop.
//!
//! ## Architecture
//! ```text
//! AvailabilityPoller (wait_for_availability)
//!   └── SailingSource (trait seam, test doubles plug in here)
//!         └── ApiClient (search payload + one-shot 401 retry)
//!               └── TokenCache (credential grant, cached expiry)
//! ```

pub mod client;
pub mod poller;
pub mod token;

pub use client::ApiClient;
pub use poller::{
    AvailabilityPoller, CheckOutcome, PollOutcome, SailingSource, StopReason, normalize_time,
};
pub use token::TokenCache;
