//! Availability poll loop.
//!
//! One authenticated query per check; the loop itself is the retry
//! mechanism for transient failures. Elapsed time is wall-clock, so
//! slow requests are never silently absorbed into the timeout budget.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;

use sailwatch_core::error::Result;
use sailwatch_core::types::{PollRequest, SailingRecord};

/// Seam between the poll loop and the HTTP client, so scripted sources
/// can drive the loop in tests.
#[async_trait]
pub trait SailingSource: Send {
    /// Fetch all slots for the requested route/date.
    async fn search(&mut self, req: &PollRequest) -> Result<Vec<SailingRecord>>;
}

/// Outcome of a single check. The retry-vs-abort decision is a
/// type-level branch, not a caught exception.
#[derive(Debug, Clone)]
pub enum CheckOutcome {
    /// Target slot found and bookable.
    Available(SailingRecord),
    /// Target slot found but not bookable yet.
    NotYetAvailable(SailingRecord),
    /// No slot matched the requested time.
    NotFound,
    /// The check itself failed (network/auth/parse). The loop continues.
    Failed(String),
}

/// Why the poll loop ended without availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The wall-clock ceiling was exceeded. A normal, expected outcome.
    Timeout,
    /// An external stop request was observed between checks.
    Cancelled,
}

/// Result of a whole monitoring phase.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub available: bool,
    pub checks: u32,
    pub elapsed: Duration,
    pub record: Option<SailingRecord>,
    pub reason: Option<StopReason>,
}

/// Normalize a time-of-day to canonical `h:mm am|pm` form.
/// 24-hour inputs (no am/pm marker) are converted; anything already
/// carrying a marker only gets lowercased and trimmed. Idempotent.
pub fn normalize_time(raw: &str) -> String {
    let time = raw.trim().to_lowercase();
    if time.contains(':') && !time.contains("am") && !time.contains("pm") {
        if let Some((hour_str, minute)) = time.split_once(':')
            && let Ok(hour) = hour_str.trim().parse::<u32>()
        {
            let minute = minute.trim();
            return match hour {
                0 => format!("12:{minute} am"),
                12 => format!("12:{minute} pm"),
                h if h > 12 => format!("{}:{minute} pm", h - 12),
                h => format!("{h}:{minute} am"),
            };
        }
    }
    time
}

/// Drives a `SailingSource` on a fixed interval until the target slot
/// is available, the timeout passes, or the caller requests a stop.
pub struct AvailabilityPoller<S: SailingSource> {
    source: S,
}

impl<S: SailingSource> AvailabilityPoller<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Perform one authenticated query and locate the requested slot.
    pub async fn check_once(&mut self, req: &PollRequest) -> CheckOutcome {
        let records = match self.source.search(req).await {
            Ok(records) => records,
            Err(e) => return CheckOutcome::Failed(e.to_string()),
        };

        let target = normalize_time(&req.time);
        match records
            .into_iter()
            .find(|r| normalize_time(&r.departure_time) == target)
        {
            Some(record) if record.is_available() => CheckOutcome::Available(record),
            Some(record) => CheckOutcome::NotYetAvailable(record),
            None => CheckOutcome::NotFound,
        }
    }

    /// Poll until available, timed out, or stopped. Stop requests are
    /// observed only between a check and the next sleep/check, never
    /// mid-request.
    pub async fn wait_for_availability(
        &mut self,
        req: &PollRequest,
        mut stop: watch::Receiver<bool>,
    ) -> PollOutcome {
        let started = Instant::now();
        let interval = Duration::from_secs(req.poll_interval_secs);
        let timeout = Duration::from_secs(req.timeout_secs);
        let mut checks: u32 = 0;

        tracing::info!(
            "🔍 Watching {} → {} on {} at {} (every {}s, up to {}s)",
            req.departure,
            req.arrival,
            req.date,
            req.time,
            req.poll_interval_secs,
            req.timeout_secs
        );

        loop {
            let elapsed = started.elapsed();
            if elapsed > timeout {
                tracing::info!(
                    "⏳ Timeout reached after {}s ({checks} checks)",
                    elapsed.as_secs()
                );
                return PollOutcome {
                    available: false,
                    checks,
                    elapsed,
                    record: None,
                    reason: Some(StopReason::Timeout),
                };
            }

            checks += 1;
            match self.check_once(req).await {
                CheckOutcome::Available(record) => {
                    let elapsed = started.elapsed();
                    tracing::info!(
                        "✅ Slot available after {}s ({checks} checks), price: {}",
                        elapsed.as_secs(),
                        record.price.as_deref().unwrap_or("n/a")
                    );
                    return PollOutcome {
                        available: true,
                        checks,
                        elapsed,
                        record: Some(record),
                        reason: None,
                    };
                }
                CheckOutcome::NotYetAvailable(record) => {
                    tracing::info!(
                        "[check #{checks}] {} not available yet ({:?})",
                        record.departure_time,
                        record.status
                    );
                }
                CheckOutcome::NotFound => {
                    tracing::warn!("[check #{checks}] no sailing found at {}", req.time);
                }
                CheckOutcome::Failed(e) => {
                    tracing::warn!("[check #{checks}] check failed: {e}");
                }
            }

            if *stop.borrow() {
                return self.cancelled(checks, started);
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = stop.changed() => {
                    if changed.is_ok() && *stop.borrow() {
                        return self.cancelled(checks, started);
                    }
                }
            }
        }
    }

    fn cancelled(&self, checks: u32, started: Instant) -> PollOutcome {
        let elapsed = started.elapsed();
        tracing::info!("⏹ Stop requested after {}s ({checks} checks)", elapsed.as_secs());
        PollOutcome {
            available: false,
            checks,
            elapsed,
            record: None,
            reason: Some(StopReason::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sailwatch_core::types::SailingStatus;

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

    fn record(time: &str, status: SailingStatus) -> SailingRecord {
        SailingRecord {
            departure_time: time.into(),
            status,
            price: Some("87.25".into()),
        }
    }

    /// Yields SOLD_OUT for the first `sold_out_checks` searches, then AVAILABLE.
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
            Ok(vec![
                record("9:00 am", SailingStatus::SoldOut),
                record("13:20", status),
            ])
        }
    }

    struct NeverAvailable;

    #[async_trait]
    impl SailingSource for NeverAvailable {
        async fn search(&mut self, _req: &PollRequest) -> Result<Vec<SailingRecord>> {
            Ok(vec![record("1:20 pm", SailingStatus::SoldOut)])
        }
    }

    struct AlwaysErrors;

    #[async_trait]
    impl SailingSource for AlwaysErrors {
        async fn search(&mut self, _req: &PollRequest) -> Result<Vec<SailingRecord>> {
            Err(sailwatch_core::error::SailwatchError::query("boom"))
        }
    }

    fn no_stop() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        // Keep the sender alive for the whole test.
        std::mem::forget(tx);
        rx
    }

    #[test]
    fn test_normalize_is_idempotent_and_symmetric() {
        assert_eq!(normalize_time("13:20"), "1:20 pm");
        assert_eq!(normalize_time("1:20 pm"), "1:20 pm");
        assert_eq!(normalize_time(normalize_time("13:20").as_str()), "1:20 pm");
        assert_eq!(normalize_time("1:20 PM"), "1:20 pm");
    }

    #[test]
    fn test_normalize_24_hour_edges() {
        assert_eq!(normalize_time("0:05"), "12:05 am");
        assert_eq!(normalize_time("12:00"), "12:00 pm");
        assert_eq!(normalize_time("23:59"), "11:59 pm");
        assert_eq!(normalize_time("9:00"), "9:00 am");
        // Unparseable hours pass through untouched apart from case/trim.
        assert_eq!(normalize_time(" Noonish "), "noonish");
    }

    #[tokio::test]
    async fn test_check_once_distinguishes_outcomes() {
        let mut poller = AvailabilityPoller::new(ScriptedSource {
            sold_out_checks: 1,
            calls: 0,
        });
        let req = request(10, 60);

        assert!(matches!(
            poller.check_once(&req).await,
            CheckOutcome::NotYetAvailable(_)
        ));
        assert!(matches!(poller.check_once(&req).await, CheckOutcome::Available(_)));

        let mut errors = AvailabilityPoller::new(AlwaysErrors);
        assert!(matches!(errors.check_once(&req).await, CheckOutcome::Failed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_available_on_sixth_check() {
        let mut poller = AvailabilityPoller::new(ScriptedSource {
            sold_out_checks: 5,
            calls: 0,
        });
        let outcome = poller.wait_for_availability(&request(10, 600), no_stop()).await;

        assert!(outcome.available);
        assert_eq!(outcome.checks, 6);
        assert!(outcome.record.unwrap().is_available());
        assert!(outcome.reason.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_when_never_available() {
        let mut poller = AvailabilityPoller::new(NeverAvailable);
        let req = request(10, 60);
        let outcome = poller.wait_for_availability(&req, no_stop()).await;

        assert!(!outcome.available);
        assert_eq!(outcome.reason, Some(StopReason::Timeout));
        assert!(outcome.elapsed >= Duration::from_secs(60));
        // checks ≈ ⌈T/I⌉ ± 1
        let expected = req.timeout_secs.div_ceil(req.poll_interval_secs) as u32;
        assert!(outcome.checks.abs_diff(expected) <= 1, "checks={}", outcome.checks);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_do_not_end_the_loop() {
        let mut poller = AvailabilityPoller::new(AlwaysErrors);
        let outcome = poller.wait_for_availability(&request(5, 20), no_stop()).await;

        assert!(!outcome.available);
        assert_eq!(outcome.reason, Some(StopReason::Timeout));
        assert!(outcome.checks >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_observed_between_checks() {
        let (tx, rx) = watch::channel(false);
        let mut poller = AvailabilityPoller::new(NeverAvailable);
        let req = request(10, 3600);

        let waiter = tokio::spawn(async move { poller.wait_for_availability(&req, rx).await });
        tokio::time::sleep(Duration::from_secs(25)).await;
        tx.send(true).unwrap();

        let outcome = waiter.await.unwrap();
        assert!(!outcome.available);
        assert_eq!(outcome.reason, Some(StopReason::Cancelled));
        assert!(outcome.elapsed < Duration::from_secs(60));
    }
}
