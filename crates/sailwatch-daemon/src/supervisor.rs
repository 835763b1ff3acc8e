//! Daemon lifecycle: detach, probe, stop, tail logs.
//!
//! The supervisor never runs the workflow itself. It spawns the same
//! binary as a detached child, confirms the child came up, and later
//! probes or signals it by pid. The pid record doubles as the
//! start-exclusion sentinel: it is claimed with exclusive creation, so
//! two concurrent starts cannot both win.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::process::{Command, Stdio};
use std::time::Duration;

use serde::Serialize;

use sailwatch_core::error::{Result, SailwatchError};
use sailwatch_core::types::{PollRequest, ResultRecord, WorkflowState, WorkflowStatus};

use crate::store::StateStore;

/// Snapshot of the background run, for `status` output.
#[derive(Debug, Serialize)]
pub struct DaemonStatus {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<WorkflowState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultRecord>,
}

/// Starts, probes, and stops the detached background run.
pub struct DaemonSupervisor {
    store: StateStore,
}

impl DaemonSupervisor {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// Non-destructive liveness probe (signal 0).
    fn pid_alive(pid: u32) -> bool {
        Command::new("kill")
            .args(["-0", &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Arguments for the detached child running the same binary.
    fn child_args(req: &PollRequest) -> Vec<String> {
        let mut args = vec![
            "monitor-and-book".to_string(),
            "--from".to_string(),
            req.departure.clone(),
            "--to".to_string(),
            req.arrival.clone(),
            "--date".to_string(),
            req.date.clone(),
            "--time".to_string(),
            req.time.clone(),
            "--adults".to_string(),
            req.adults.to_string(),
            "--children".to_string(),
            req.children.to_string(),
            "--seniors".to_string(),
            req.seniors.to_string(),
            "--infants".to_string(),
            req.infants.to_string(),
            "--poll-interval".to_string(),
            req.poll_interval_secs.to_string(),
            "--timeout".to_string(),
            req.timeout_secs.to_string(),
        ];
        if !req.vehicle {
            args.push("--no-vehicle".to_string());
        }
        args.push("--daemon-child".to_string());
        args
    }

    /// Claim the pid slot for a new run owner, clearing stale records.
    /// The claim must carry a live pid: concurrent starters probe the
    /// recorded pid, and a live one makes them back off with
    /// `AlreadyRunning` instead of clearing a claim that is merely
    /// seconds old.
    pub fn claim_run_slot(&self, pid: u32) -> Result<()> {
        loop {
            if self.store.claim_pid_slot(pid)? {
                return Ok(());
            }
            match self.store.read_pid() {
                // 0 is never a valid owner (signal 0 to pid 0 hits the
                // whole process group and always "succeeds").
                Some(existing) if existing != 0 && Self::pid_alive(existing) => {
                    return Err(SailwatchError::AlreadyRunning(existing));
                }
                _ => {
                    tracing::warn!("⚠️ Stale pid record found, clearing");
                    self.store.clear_pid();
                }
            }
        }
    }

    /// Spawn the background run. Returns the child pid, or
    /// `AlreadyRunning` when a live run holds the pid slot.
    pub fn start(&self, req: &PollRequest) -> Result<u32> {
        // Claim the slot with our own pid; the child overwrites it with
        // its own once the workflow is up.
        let own = std::process::id();
        self.claim_run_slot(own)?;

        let exe = std::env::current_exe()?;
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.store.log_path())?;
        let stderr_log = log.try_clone()?;

        let child = Command::new(exe)
            .args(Self::child_args(req))
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(stderr_log))
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                self.store.clear_pid();
                return Err(e.into());
            }
        };
        let spawned_pid = child.id();
        tracing::info!("🚀 Daemon spawned (pid {spawned_pid})");

        // Wait briefly for the child to overwrite the record with its
        // own pid; a child that dies on startup is reported here rather
        // than silently leaving our claim behind.
        for _ in 0..20 {
            std::thread::sleep(Duration::from_millis(50));
            if let Some(pid) = self.store.read_pid()
                && pid != own
                && Self::pid_alive(pid)
            {
                return Ok(pid);
            }
        }

        self.store.clear_pid();
        Err(SailwatchError::Store(format!(
            "daemon (pid {spawned_pid}) did not come up; see {}",
            self.store.log_path().display()
        )))
    }

    /// Current run snapshot. The final result is only surfaced once the
    /// run is no longer live.
    pub fn status(&self) -> Result<DaemonStatus> {
        let pid = self.store.read_pid().filter(|p| *p != 0);
        let running = pid.is_some_and(Self::pid_alive);
        let state = self.store.load_state()?;
        let result = if running { None } else { self.store.load_result()? };
        Ok(DaemonStatus {
            running,
            pid: if running { pid } else { None },
            state,
            result,
        })
    }

    /// Stop the background run: TERM first, KILL if it lingers. The
    /// recorded state is moved to `stopped` unless already terminal.
    pub fn stop(&self) -> Result<bool> {
        let Some(pid) = self.store.read_pid().filter(|p| *p != 0) else {
            tracing::info!("No daemon pid recorded; nothing to stop");
            return Ok(false);
        };
        if !Self::pid_alive(pid) {
            tracing::warn!("⚠️ Recorded pid {pid} is not running; clearing record");
            self.store.clear_pid();
            return Ok(false);
        }

        tracing::info!("🛑 Stopping daemon (pid {pid})");
        Command::new("kill").arg(pid.to_string()).status()?;
        if !Self::wait_for_exit(pid, 25, Duration::from_millis(200)) {
            tracing::warn!("⚠️ Pid {pid} ignored TERM, escalating to KILL");
            Command::new("kill").args(["-9", &pid.to_string()]).status()?;
            if !Self::wait_for_exit(pid, 25, Duration::from_millis(200)) {
                return Err(SailwatchError::StopFailed(pid));
            }
        }

        // A killed child may not have written its own terminal state.
        if let Ok(Some(mut state)) = self.store.load_state()
            && !state.status.is_terminal()
            && state.transition(WorkflowStatus::Stopped).is_ok()
        {
            self.store.save_state(&state)?;
        }
        self.store.clear_pid();
        tracing::info!("✅ Daemon stopped");
        Ok(true)
    }

    fn wait_for_exit(pid: u32, attempts: u32, interval: Duration) -> bool {
        for _ in 0..attempts {
            if !Self::pid_alive(pid) {
                return true;
            }
            std::thread::sleep(interval);
        }
        !Self::pid_alive(pid)
    }

    /// Print the last `lines` of the daemon log; with `follow`, keep
    /// streaming appended output until interrupted.
    pub fn logs(&self, follow: bool, lines: usize) -> Result<()> {
        let path = self.store.log_path();
        if !path.exists() {
            tracing::info!("No daemon log at {}", path.display());
            return Ok(());
        }

        let file = std::fs::File::open(&path)?;
        let mut reader = BufReader::new(file);
        let tail: Vec<String> = {
            let all: Vec<String> = reader.by_ref().lines().map_while(|l| l.ok()).collect();
            let skip = all.len().saturating_sub(lines);
            all.into_iter().skip(skip).collect()
        };
        for line in &tail {
            println!("{line}");
        }

        if !follow {
            return Ok(());
        }

        let mut offset = std::fs::metadata(&path)?.len();
        loop {
            std::thread::sleep(Duration::from_millis(500));
            let len = std::fs::metadata(&path)?.len();
            if len < offset {
                // Log was replaced; start over from the top.
                offset = 0;
            }
            if len > offset {
                let mut file = std::fs::File::open(&path)?;
                file.seek(SeekFrom::Start(offset))?;
                let mut buf = String::new();
                file.read_to_string(&mut buf)?;
                print!("{buf}");
                offset = len;
            }
        }
    }
}
