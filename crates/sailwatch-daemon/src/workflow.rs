//! Workflow state machine: monitoring → booking → {completed, failed}.
//!
//! Every transition is persisted before the run moves on, so an outside
//! observer never sees "no state" for a live run. Terminal states write
//! the single immutable result record. Any internal error after the run
//! starts is captured into a failed record and the pid record is
//! cleaned up; the process never vanishes leaving stale "running" state.

use chrono::Utc;
use tokio::sync::watch;

use sailwatch_api::poller::{AvailabilityPoller, SailingSource, StopReason};
use sailwatch_core::error::Result;
use sailwatch_core::types::{PollRequest, ResultRecord, ResultStage, WorkflowState, WorkflowStatus};

use crate::booking::{self, BookingAutomator};
use crate::store::StateStore;

/// Sequences polling → booking → terminal state over the state store.
pub struct WorkflowRunner {
    store: StateStore,
}

impl WorkflowRunner {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// Run the full workflow, capturing any internal error into a
    /// failed state/result before it propagates.
    pub async fn execute<S, B>(
        &self,
        req: &PollRequest,
        poller: &mut AvailabilityPoller<S>,
        automator: &mut B,
        stop: watch::Receiver<bool>,
    ) -> Result<WorkflowState>
    where
        S: SailingSource,
        B: BookingAutomator,
    {
        let outcome = self.run(req, poller, automator, stop).await;
        if let Err(e) = &outcome {
            tracing::error!("💥 Workflow aborted internally: {e}");
            self.record_internal_failure(e.to_string());
        }
        self.store.clear_pid();
        outcome
    }

    async fn run<S, B>(
        &self,
        req: &PollRequest,
        poller: &mut AvailabilityPoller<S>,
        automator: &mut B,
        stop: watch::Receiver<bool>,
    ) -> Result<WorkflowState>
    where
        S: SailingSource,
        B: BookingAutomator,
    {
        let mut state = WorkflowState::new(req, std::process::id());
        self.store.write_pid(state.pid)?;
        self.store.save_state(&state)?;
        tracing::info!("🚢 Workflow started (pid {})", state.pid);

        let outcome = poller.wait_for_availability(req, stop).await;
        if !outcome.available {
            return match outcome.reason {
                Some(StopReason::Cancelled) => {
                    state.transition(WorkflowStatus::Stopped)?;
                    self.store.save_state(&state)?;
                    tracing::info!("⏹ Workflow stopped by request");
                    Ok(state)
                }
                _ => {
                    let message = format!(
                        "monitoring timed out after {}s ({} checks)",
                        outcome.elapsed.as_secs(),
                        outcome.checks
                    );
                    state.error = Some(message.clone());
                    state.transition(WorkflowStatus::Failed)?;
                    self.store.save_state(&state)?;
                    self.store.save_result(&ResultRecord::failure(
                        ResultStage::Monitoring,
                        state.started_at,
                        message,
                        false,
                    ))?;
                    Ok(state)
                }
            };
        }

        state.available_at = Some(Utc::now());
        state.transition(WorkflowStatus::Booking)?;
        self.store.save_state(&state)?;
        tracing::info!(
            "🎯 Slot available after {} checks; starting booking",
            outcome.checks
        );

        match booking::run_all(automator).await {
            None => {
                state.transition(WorkflowStatus::Completed)?;
                self.store.save_state(&state)?;
                self.store
                    .save_result(&ResultRecord::success(ResultStage::Booking, state.started_at))?;
                tracing::info!("🎉 Booking completed");
                Ok(state)
            }
            Some((step, result)) => {
                let message = format!("{step}: {}", result.message);
                state.error = Some(message.clone());
                state.transition(WorkflowStatus::Failed)?;
                self.store.save_state(&state)?;
                self.store.save_result(&ResultRecord::failure(
                    ResultStage::Booking,
                    state.started_at,
                    message,
                    result.race_condition,
                ))?;
                Ok(state)
            }
        }
    }

    /// Best-effort capture of an internal error into the durable records.
    fn record_internal_failure(&self, message: String) {
        if let Ok(Some(mut state)) = self.store.load_state()
            && !state.status.is_terminal()
        {
            let stage = if state.status == WorkflowStatus::Booking {
                ResultStage::Booking
            } else {
                ResultStage::Monitoring
            };
            state.error = Some(message.clone());
            if state.transition(WorkflowStatus::Failed).is_ok() {
                self.store.save_state(&state).ok();
            }
            self.store
                .save_result(&ResultRecord::failure(stage, state.started_at, message, false))
                .ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sailwatch_core::types::{SailingRecord, SailingStatus};
    use std::collections::HashMap;

    use crate::booking::{BOOKING_STEPS, StepResult};

    fn request(interval: u64, timeout: u64) -> PollRequest {
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
            poll_interval_secs: interval,
            timeout_secs: timeout,
        }
    }

    struct ScriptedSource {
        sold_out_checks: u32,
        calls: u32,
    }

    #[async_trait]
    impl SailingSource for ScriptedSource {
        async fn search(&mut self, _req: &PollRequest) -> Result<Vec<SailingRecord>> {
            self.calls += 1;
            let status = if self.calls > self.sold_out_checks {
                SailingStatus::Available
            } else {
                SailingStatus::SoldOut
            };
            Ok(vec![SailingRecord {
                departure_time: "1:20 pm".into(),
                status,
                price: Some("87.25".into()),
            }])
        }
    }

    struct ScriptedAutomator {
        failures: HashMap<&'static str, StepResult>,
        executed: Vec<String>,
    }

    impl ScriptedAutomator {
        fn all_success() -> Self {
            Self {
                failures: HashMap::new(),
                executed: Vec::new(),
            }
        }

        fn failing_at(step: &'static str, result: StepResult) -> Self {
            let mut failures = HashMap::new();
            failures.insert(step, result);
            Self {
                failures,
                executed: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl BookingAutomator for ScriptedAutomator {
        async fn run_step(&mut self, step: &str) -> StepResult {
            self.executed.push(step.to_string());
            self.failures
                .get(step)
                .cloned()
                .unwrap_or_else(|| StepResult::ok(format!("{step} done")))
        }
    }

    fn temp_store(tag: &str) -> StateStore {
        let dir = std::env::temp_dir().join(format!("sailwatch-test-workflow-{tag}"));
        std::fs::remove_dir_all(&dir).ok();
        StateStore::new(dir)
    }

    fn no_stop() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        std::mem::forget(tx);
        rx
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_success() {
        let store = temp_store("success");
        let runner = WorkflowRunner::new(store.clone());
        let mut poller = AvailabilityPoller::new(ScriptedSource {
            sold_out_checks: 3,
            calls: 0,
        });
        let mut automator = ScriptedAutomator::all_success();

        let state = runner
            .execute(&request(10, 60), &mut poller, &mut automator, no_stop())
            .await
            .unwrap();

        assert_eq!(state.status, WorkflowStatus::Completed);
        assert!(state.available_at.is_some());
        assert_eq!(automator.executed, BOOKING_STEPS.to_vec());

        let result = store.load_result().unwrap().unwrap();
        assert!(result.success);
        assert_eq!(result.stage, ResultStage::Booking);
        assert!(!result.race_condition);

        // Pid record is cleaned up at termination.
        assert!(store.read_pid().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_race_condition_is_distinguishable() {
        let store = temp_store("race");
        let runner = WorkflowRunner::new(store.clone());
        let mut poller = AvailabilityPoller::new(ScriptedSource {
            sold_out_checks: 0,
            calls: 0,
        });
        let mut automator = ScriptedAutomator::failing_at(
            "sailing",
            StepResult {
                success: false,
                message: "sailing sold out before booking could complete".into(),
                race_condition: true,
            },
        );

        let state = runner
            .execute(&request(10, 60), &mut poller, &mut automator, no_stop())
            .await
            .unwrap();

        assert_eq!(state.status, WorkflowStatus::Failed);
        let result = store.load_result().unwrap().unwrap();
        assert!(!result.success);
        assert_eq!(result.stage, ResultStage::Booking);
        assert!(result.race_condition);
        assert!(result.error.unwrap().starts_with("sailing:"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ordinary_step_failure_is_not_a_race() {
        let store = temp_store("step-failure");
        let runner = WorkflowRunner::new(store.clone());
        let mut poller = AvailabilityPoller::new(ScriptedSource {
            sold_out_checks: 0,
            calls: 0,
        });
        let mut automator =
            ScriptedAutomator::failing_at("payment", StepResult::failed("card declined"));

        let state = runner
            .execute(&request(10, 60), &mut poller, &mut automator, no_stop())
            .await
            .unwrap();

        assert_eq!(state.status, WorkflowStatus::Failed);
        let result = store.load_result().unwrap().unwrap();
        assert!(!result.race_condition);
        assert_eq!(result.stage, ResultStage::Booking);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_at_monitoring_stage() {
        let store = temp_store("timeout");
        let runner = WorkflowRunner::new(store.clone());
        let mut poller = AvailabilityPoller::new(ScriptedSource {
            sold_out_checks: u32::MAX,
            calls: 0,
        });
        let mut automator = ScriptedAutomator::all_success();

        let state = runner
            .execute(&request(10, 30), &mut poller, &mut automator, no_stop())
            .await
            .unwrap();

        assert_eq!(state.status, WorkflowStatus::Failed);
        assert!(automator.executed.is_empty());

        let result = store.load_result().unwrap().unwrap();
        assert!(!result.success);
        assert_eq!(result.stage, ResultStage::Monitoring);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_request_records_stopped_without_result() {
        let store = temp_store("stopped");
        let runner = WorkflowRunner::new(store.clone());
        let mut poller = AvailabilityPoller::new(ScriptedSource {
            sold_out_checks: u32::MAX,
            calls: 0,
        });
        let mut automator = ScriptedAutomator::all_success();
        let (tx, rx) = watch::channel(false);

        let req = request(10, 3600);
        let store_probe = store.clone();
        let run = tokio::spawn(async move {
            runner.execute(&req, &mut poller, &mut automator, rx).await
        });

        tokio::time::sleep(std::time::Duration::from_secs(25)).await;
        // State is externally visible while the run is live.
        let live = store_probe.load_state().unwrap().unwrap();
        assert_eq!(live.status, WorkflowStatus::Monitoring);
        tx.send(true).unwrap();

        let state = run.await.unwrap().unwrap();
        assert_eq!(state.status, WorkflowStatus::Stopped);
        assert!(store.load_result().unwrap().is_none());
        assert!(store.read_pid().is_none());
    }
}
