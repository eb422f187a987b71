//! Task identity, state and progress tracking

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Where a finished download is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadTarget {
    /// Leech: upload back to Telegram
    Telegram,
    /// Mirror: upload to Google Drive
    Drive,
}

impl UploadTarget {
    /// Parse `tg`/`gd` style names (case-insensitive)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "tg" | "telegram" | "leech" => Some(UploadTarget::Telegram),
            "gd" | "gdrive" | "drive" | "mirror" => Some(UploadTarget::Drive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadTarget::Telegram => "tg",
            UploadTarget::Drive => "gd",
        }
    }

    /// Human name of the operation
    pub fn verb(&self) -> &'static str {
        match self {
            UploadTarget::Telegram => "Leech",
            UploadTarget::Drive => "Mirror",
        }
    }
}

/// Lifecycle of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Queued,
    Downloading,
    Uploading,
    Completed,
    Failed,
    Cancelled,
    /// Found active in the database after a restart
    Interrupted,
}

impl TaskState {
    /// Name persisted in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Downloading => "downloading",
            TaskState::Uploading => "uploading",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
            TaskState::Interrupted => "interrupted",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskState::Queued => "Queued",
            TaskState::Downloading => "Downloading",
            TaskState::Uploading => "Uploading",
            TaskState::Completed => "Completed",
            TaskState::Failed => "Failed",
            TaskState::Cancelled => "Cancelled",
            TaskState::Interrupted => "Interrupted",
        }
    }

    /// Whether the task can still make progress
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TaskState::Queued | TaskState::Downloading | TaskState::Uploading
        )
    }

    /// States stored in the database that a restart interrupts
    pub fn active_names() -> [&'static str; 3] {
        ["queued", "downloading", "uploading"]
    }
}

/// Byte counters for the current phase of a task
///
/// Shared between the worker (which advances it) and the status reporter
/// (which reads snapshots).
#[derive(Debug)]
pub struct Progress {
    done: AtomicU64,
    total: AtomicU64,
    started: Mutex<Instant>,
}

/// Point-in-time view of a [`Progress`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub done: u64,
    /// Zero when unknown
    pub total: u64,
    /// Bytes per second since the phase began
    pub speed: f64,
    /// Seconds remaining, if the total and speed are known
    pub eta: Option<u64>,
    /// 0.0 to 100.0
    pub percent: f64,
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress {
    pub fn new() -> Self {
        Self {
            done: AtomicU64::new(0),
            total: AtomicU64::new(0),
            started: Mutex::new(Instant::now()),
        }
    }

    /// Reset counters for a new phase (download or upload)
    pub fn start_phase(&self, total: u64) {
        self.done.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
        *self.started.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    pub fn add_total(&self, bytes: u64) {
        self.total.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn set_total(&self, bytes: u64) {
        self.total.store(bytes, Ordering::Relaxed);
    }

    pub fn advance(&self, bytes: u64) {
        self.done.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn set_done(&self, bytes: u64) {
        self.done.store(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let done = self.done.load(Ordering::Relaxed);
        let total = self.total.load(Ordering::Relaxed);
        let elapsed = self
            .started
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
            .as_secs_f64();

        let speed = if elapsed > 0.0 { done as f64 / elapsed } else { 0.0 };
        let percent = if total > 0 {
            (done as f64 / total as f64 * 100.0).min(100.0)
        } else {
            0.0
        };
        let eta = if total > done && speed > 0.0 {
            Some(((total - done) as f64 / speed).ceil() as u64)
        } else {
            None
        };

        ProgressSnapshot {
            done,
            total,
            speed,
            eta,
            percent,
        }
    }
}

/// Everything known about a registered task
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub gid: String,
    pub name: String,
    /// Link or file description the task was started from
    pub source: String,
    pub target: UploadTarget,
    pub user_id: u64,
    pub chat_id: i64,
    pub state: TaskState,
    pub created_at: DateTime<Utc>,
    pub progress: Arc<Progress>,
}

/// Generate a task id
///
/// # Arguments
/// * `seed` - Source description of the task
/// * `seq` - Process-wide sequence number
///
/// # Returns
/// * 16-character lowercase hexadecimal id
pub fn generate_gid(seed: &str, seq: u64) -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(seq.to_le_bytes());
    hasher.update(nanos.to_le_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}
