//! Core data model: poll requests, sailing records, workflow state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SailwatchError};

/// Immutable description of one monitoring run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollRequest {
    /// Departure terminal name or code (e.g. "Departure Bay", "TSA").
    pub departure: String,
    /// Arrival terminal name or code.
    pub arrival: String,
    /// Travel date, passed through to the source as given.
    pub date: String,
    /// Target time-of-day (e.g. "1:20 pm" or "13:20").
    pub time: String,
    pub adults: u32,
    pub children: u32,
    pub seniors: u32,
    pub infants: u32,
    /// Travelling with a vehicle (false = walk-on).
    pub vehicle: bool,
    /// Seconds between availability checks.
    pub poll_interval_secs: u64,
    /// Wall-clock ceiling for the whole monitoring phase.
    pub timeout_secs: u64,
}

impl PollRequest {
    /// Validate before any run state is created. Failures here are
    /// `Argument` errors and exit code 2 territory.
    pub fn validate(&self) -> Result<()> {
        if self.departure.trim().is_empty() || self.arrival.trim().is_empty() {
            return Err(SailwatchError::argument("departure and arrival are required"));
        }
        if self.date.trim().is_empty() {
            return Err(SailwatchError::argument("travel date is required"));
        }
        if self.time.trim().is_empty() {
            return Err(SailwatchError::argument("target sailing time is required"));
        }
        if self.adults + self.children + self.seniors == 0 {
            return Err(SailwatchError::argument(
                "at least one adult, child, or senior passenger is required",
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(SailwatchError::argument("poll interval must be at least 1s"));
        }
        if self.timeout_secs == 0 {
            return Err(SailwatchError::argument("timeout must be at least 1s"));
        }
        if self.poll_interval_secs >= self.timeout_secs {
            return Err(SailwatchError::argument(
                "poll interval must be shorter than the timeout",
            ));
        }
        if self.poll_interval_secs < 10 {
            tracing::warn!("⚠️ Poll interval < 10s may hit source rate limits");
        }
        Ok(())
    }
}

/// Availability status of one sailing slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SailingStatus {
    Available,
    SoldOut,
    Unknown,
}

impl SailingStatus {
    /// A slot is available iff the source says exactly `AVAILABLE`.
    /// Any other value, including ones we have never seen, is not-available.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "AVAILABLE" => Self::Available,
            "SOLD_OUT" => Self::SoldOut,
            _ => Self::Unknown,
        }
    }
}

/// One candidate slot from the source. Ephemeral; re-fetched every poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SailingRecord {
    /// Departure time-of-day as reported by the source.
    pub departure_time: String,
    pub status: SailingStatus,
    pub price: Option<String>,
}

impl SailingRecord {
    pub fn is_available(&self) -> bool {
        self.status == SailingStatus::Available
    }
}

/// Workflow status. Transitions are monotonic along
/// monitoring → booking → {completed, failed}; `stopped` is reachable
/// from any non-terminal state; terminal states accept no transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Monitoring,
    Booking,
    Completed,
    Failed,
    Stopped,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// Validating transition check.
    pub fn can_transition_to(&self, next: WorkflowStatus) -> bool {
        match self {
            Self::Monitoring => matches!(
                next,
                Self::Booking | Self::Failed | Self::Stopped
            ),
            Self::Booking => matches!(next, Self::Completed | Self::Failed | Self::Stopped),
            Self::Completed | Self::Failed | Self::Stopped => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monitoring => "monitoring",
            Self::Booking => "booking",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }
}

/// Cross-process-visible state of the single live run.
/// Mutated only by the owning process; read by anyone via the state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub status: WorkflowStatus,
    pub departure: String,
    pub arrival: String,
    pub date: String,
    pub time: String,
    pub started_at: DateTime<Utc>,
    pub available_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Process id of the run owner.
    pub pid: u32,
}

impl WorkflowState {
    /// Fresh state entering `monitoring`, persisted before the first poll.
    pub fn new(req: &PollRequest, pid: u32) -> Self {
        Self {
            status: WorkflowStatus::Monitoring,
            departure: req.departure.clone(),
            arrival: req.arrival.clone(),
            date: req.date.clone(),
            time: req.time.clone(),
            started_at: Utc::now(),
            available_at: None,
            completed_at: None,
            error: None,
            pid,
        }
    }

    /// Apply a transition, rejecting illegal ones. Terminal transitions
    /// stamp `completed_at`.
    pub fn transition(&mut self, next: WorkflowStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(SailwatchError::Transition {
                from: self.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }
}

/// Stage at which a run concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStage {
    Monitoring,
    Booking,
}

/// Terminal outcome record. Written exactly once per run; immutable
/// until a new run overwrites it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    pub success: bool,
    pub stage: ResultStage,
    pub error: Option<String>,
    /// The failure was a benign availability race, not an automation defect.
    #[serde(default)]
    pub race_condition: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ResultRecord {
    pub fn success(stage: ResultStage, started_at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            stage,
            error: None,
            race_condition: false,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn failure(
        stage: ResultStage,
        started_at: DateTime<Utc>,
        error: impl Into<String>,
        race_condition: bool,
    ) -> Self {
        Self {
            success: false,
            stage,
            error: Some(error.into()),
            race_condition,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PollRequest {
        PollRequest {
            departure: "Departure Bay".into(),
            arrival: "Horseshoe Bay".into(),
            date: "2025-10-15".into(),
            time: "1:20 pm".into(),
            adults: 2,
            children: 0,
            seniors: 0,
            infants: 0,
            vehicle: true,
            poll_interval_secs: 10,
            timeout_secs: 60,
        }
    }

    #[test]
    fn test_validate_accepts_reasonable_request() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_no_passengers() {
        let mut req = request();
        req.adults = 0;
        // Infants cannot travel alone.
        req.infants = 1;
        assert!(matches!(
            req.validate(),
            Err(SailwatchError::Argument(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut req = request();
        req.poll_interval_secs = 0;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_interval_longer_than_timeout() {
        let mut req = request();
        req.poll_interval_secs = 60;
        req.timeout_secs = 60;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_status_parse_is_exact() {
        assert_eq!(SailingStatus::parse("AVAILABLE"), SailingStatus::Available);
        assert_eq!(SailingStatus::parse("SOLD_OUT"), SailingStatus::SoldOut);
        // Unknown and new statuses are not-available.
        assert_eq!(SailingStatus::parse("available"), SailingStatus::Unknown);
        assert_eq!(SailingStatus::parse("WAITLISTED"), SailingStatus::Unknown);
        assert!(!SailingRecord {
            departure_time: "1:20 pm".into(),
            status: SailingStatus::parse("WAITLISTED"),
            price: None,
        }
        .is_available());
    }

    #[test]
    fn test_transitions_follow_the_ladder() {
        let mut state = WorkflowState::new(&request(), 42);
        assert_eq!(state.status, WorkflowStatus::Monitoring);
        state.transition(WorkflowStatus::Booking).unwrap();
        state.transition(WorkflowStatus::Completed).unwrap();
        assert!(state.completed_at.is_some());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut state = WorkflowState::new(&request(), 42);
        state.transition(WorkflowStatus::Failed).unwrap();
        for next in [
            WorkflowStatus::Monitoring,
            WorkflowStatus::Booking,
            WorkflowStatus::Completed,
            WorkflowStatus::Stopped,
        ] {
            assert!(state.transition(next).is_err(), "failed → {next:?} must be rejected");
        }
    }

    #[test]
    fn test_completed_to_booking_is_rejected() {
        let mut state = WorkflowState::new(&request(), 1);
        state.transition(WorkflowStatus::Booking).unwrap();
        state.transition(WorkflowStatus::Completed).unwrap();
        assert!(state.transition(WorkflowStatus::Booking).is_err());
    }

    #[test]
    fn test_stopped_reachable_from_non_terminal() {
        let mut state = WorkflowState::new(&request(), 1);
        state.transition(WorkflowStatus::Stopped).unwrap();
        assert!(state.status.is_terminal());

        let mut state = WorkflowState::new(&request(), 1);
        state.transition(WorkflowStatus::Booking).unwrap();
        assert!(state.transition(WorkflowStatus::Stopped).is_ok());
    }

    #[test]
    fn test_state_json_round_trip() {
        let state = WorkflowState::new(&request(), 7);
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"monitoring\""));
        let back: WorkflowState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, WorkflowStatus::Monitoring);
        assert_eq!(back.pid, 7);
    }
}
