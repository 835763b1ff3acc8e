//! File-backed run state — readable by any collaborating process.
//!
//! Layout under the sailwatch home dir:
//!   daemon.pid   — pid record, the start-exclusion sentinel
//!   daemon.log   — append-only daemon output
//!   state.json   — WorkflowState, rewritten on every transition
//!   result.json  — ResultRecord, written once at termination
//!
//! JSON writes go through write-temp-then-rename so a concurrent reader
//! never observes partial content.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use sailwatch_core::error::{Result, SailwatchError};
use sailwatch_core::types::{ResultRecord, WorkflowState};

/// Persists workflow status, daemon pid, and the final result.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Create a store rooted at the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).ok();
        Self { dir }
    }

    /// Store rooted at the sailwatch home dir.
    pub fn with_defaults() -> Self {
        Self::new(sailwatch_core::config::SailwatchConfig::home_dir())
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join("state.json")
    }

    pub fn result_path(&self) -> PathBuf {
        self.dir.join("result.json")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.dir.join("daemon.pid")
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join("daemon.log")
    }

    /// Atomic replace: write a sibling temp file, then rename over the target.
    fn write_atomic(&self, path: &Path, content: &str) -> Result<()> {
        let tmp = path.with_extension("tmp");
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn save_state(&self, state: &WorkflowState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| SailwatchError::Store(format!("serialize state: {e}")))?;
        self.write_atomic(&self.state_path(), &json)?;
        tracing::debug!("💾 State saved: {}", state.status.as_str());
        Ok(())
    }

    pub fn load_state(&self) -> Result<Option<WorkflowState>> {
        self.load_json(&self.state_path())
    }

    pub fn save_result(&self, result: &ResultRecord) -> Result<()> {
        let json = serde_json::to_string_pretty(result)
            .map_err(|e| SailwatchError::Store(format!("serialize result: {e}")))?;
        self.write_atomic(&self.result_path(), &json)
    }

    pub fn load_result(&self) -> Result<Option<ResultRecord>> {
        self.load_json(&self.result_path())
    }

    fn load_json<T: serde::de::DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        let value = serde_json::from_str(&content)
            .map_err(|e| SailwatchError::Store(format!("parse {}: {e}", path.display())))?;
        Ok(Some(value))
    }

    /// Claim the pid slot exclusively. Returns false when a record
    /// already exists (live or stale — the caller decides which).
    pub fn claim_pid_slot(&self, pid: u32) -> Result<bool> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.pid_path())
        {
            Ok(mut file) => {
                file.write_all(pid.to_string().as_bytes())?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrite the pid record (atomic). Used by the child to record itself.
    pub fn write_pid(&self, pid: u32) -> Result<()> {
        self.write_atomic(&self.pid_path(), &pid.to_string())
    }

    pub fn read_pid(&self) -> Option<u32> {
        std::fs::read_to_string(self.pid_path())
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    pub fn clear_pid(&self) {
        std::fs::remove_file(self.pid_path()).ok();
    }
}
