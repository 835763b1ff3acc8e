//! Booking automator contract.
//!
//! The claim itself (page-level form driving) lives in an external
//! runner. The core only knows the fixed step order and the step-result
//! shape, including the race-condition signal raised when the slot sold
//! out between the availability check and the claim attempt.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use sailwatch_core::config::BookingConfig;
use sailwatch_core::types::PollRequest;

/// Fixed step order. The runner stops at the first failure.
pub const BOOKING_STEPS: [&str; 11] = [
    "login",
    "navigate",
    "terminals",
    "date",
    "passengers",
    "vehicle",
    "sailing",
    "fare",
    "checkout",
    "payment",
    "submit",
];

/// Outcome of one automator step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    /// Slot reported available by the poller but already claimed by the
    /// time the automator reached it. Benign, expected; not a defect.
    #[serde(default)]
    pub race_condition: bool,
}

impl StepResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            race_condition: false,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            race_condition: false,
        }
    }
}

/// Performs the downstream claim, one named step at a time.
#[async_trait]
pub trait BookingAutomator: Send {
    async fn run_step(&mut self, step: &str) -> StepResult;
}

/// Drive every step in order; stop at the first failure.
/// Returns the failing step's name and result, or None on full success.
pub async fn run_all<B: BookingAutomator>(
    automator: &mut B,
) -> Option<(&'static str, StepResult)> {
    for step in BOOKING_STEPS {
        tracing::info!("▶️ [{step}] starting");
        let result = automator.run_step(step).await;
        if !result.success {
            if result.race_condition {
                tracing::warn!("🏁 [{step}] lost the race: {}", result.message);
            } else {
                tracing::warn!("❌ [{step}] failed: {}", result.message);
            }
            return Some((step, result));
        }
        tracing::info!("✅ [{step}] completed");
    }
    None
}

/// Invokes a configured external program once per step, passing the
/// run parameters through environment variables. Account credentials
/// and payment fields are expected in the runner's own environment,
/// never copied through here.
pub struct CommandAutomator {
    cmd: String,
    env: Vec<(String, String)>,
}

impl CommandAutomator {
    pub fn new(config: &BookingConfig, req: &PollRequest) -> Self {
        let env = vec![
            ("DEPARTURE".to_string(), req.departure.clone()),
            ("ARRIVAL".to_string(), req.arrival.clone()),
            ("DATE".to_string(), req.date.clone()),
            ("SAILING_TIME".to_string(), req.time.clone()),
            ("ADULTS".to_string(), req.adults.to_string()),
            ("CHILDREN".to_string(), req.children.to_string()),
            ("SENIORS".to_string(), req.seniors.to_string()),
            ("INFANTS".to_string(), req.infants.to_string()),
            ("VEHICLE_HEIGHT".to_string(), config.vehicle_height.clone()),
            ("VEHICLE_LENGTH".to_string(), config.vehicle_length.clone()),
            ("DRY_RUN".to_string(), config.dry_run.to_string()),
        ];
        Self {
            cmd: config.runner_cmd.clone(),
            env,
        }
    }
}

#[async_trait]
impl BookingAutomator for CommandAutomator {
    async fn run_step(&mut self, step: &str) -> StepResult {
        let output = match tokio::process::Command::new(&self.cmd)
            .arg(step)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) => return StepResult::failed(format!("runner failed to launch: {e}")),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        // Last JSON line of stdout is the step result.
        if let Some(result) = stdout
            .lines()
            .rev()
            .find_map(|line| serde_json::from_str::<StepResult>(line.trim()).ok())
        {
            return result;
        }

        if output.status.success() {
            StepResult::ok(format!("{step} exited 0 (no structured result)"))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            StepResult::failed(format!(
                "{step} exited {}: {}",
                output.status,
                stderr.trim()
            ))
        }
    }
}
