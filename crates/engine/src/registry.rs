//! In-memory registry of running tasks and the queue limits they share

use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, EngineResult};
use crate::task::{generate_gid, Progress, TaskInfo, TaskState, UploadTarget};

/// Queue a permit is requested from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Held for the task's whole life
    All,
    Download,
    Upload,
}

/// Queue limits; zero means unlimited
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueLimits {
    pub all: usize,
    pub download: usize,
    pub upload: usize,
}

/// Parameters for registering a new task
#[derive(Debug, Clone)]
pub struct NewTask {
    pub name: String,
    pub source: String,
    pub target: UploadTarget,
    pub user_id: u64,
    pub chat_id: i64,
}

/// Handle given to the worker that runs a task
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub gid: String,
    pub cancel: CancellationToken,
    pub progress: Arc<Progress>,
}

#[derive(Debug)]
struct TaskEntry {
    info: TaskInfo,
    cancel: CancellationToken,
}

/// Shared task registry
#[derive(Clone, Debug)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<String, TaskEntry>>>,
    seq: Arc<AtomicU64>,
    all: Option<Arc<Semaphore>>,
    download: Option<Arc<Semaphore>>,
    upload: Option<Arc<Semaphore>>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new(QueueLimits::default())
    }
}

fn semaphore(limit: usize) -> Option<Arc<Semaphore>> {
    (limit > 0).then(|| Arc::new(Semaphore::new(limit)))
}

impl TaskRegistry {
    pub fn new(limits: QueueLimits) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            seq: Arc::new(AtomicU64::new(0)),
            all: semaphore(limits.all),
            download: semaphore(limits.download),
            upload: semaphore(limits.upload),
        }
    }

    /// Register a task in the `Queued` state
    pub fn register(&self, task: NewTask) -> TaskHandle {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());

        let mut gid = generate_gid(&task.source, seq);
        while tasks.contains_key(&gid) {
            gid = generate_gid(&task.source, self.seq.fetch_add(1, Ordering::Relaxed));
        }

        let cancel = CancellationToken::new();
        let progress = Arc::new(Progress::new());
        let info = TaskInfo {
            gid: gid.clone(),
            name: task.name,
            source: task.source,
            target: task.target,
            user_id: task.user_id,
            chat_id: task.chat_id,
            state: TaskState::Queued,
            created_at: Utc::now(),
            progress: progress.clone(),
        };
        tasks.insert(
            gid.clone(),
            TaskEntry {
                info,
                cancel: cancel.clone(),
            },
        );
        tracing::debug!("Registered task {}", gid);

        TaskHandle {
            gid,
            cancel,
            progress,
        }
    }

    pub fn set_state(&self, gid: &str, state: TaskState) {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = tasks.get_mut(gid) {
            entry.info.state = state;
        }
    }

    pub fn set_name(&self, gid: &str, name: &str) {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = tasks.get_mut(gid) {
            entry.info.name = name.to_string();
        }
    }

    pub fn get(&self, gid: &str) -> Option<TaskInfo> {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        tasks.get(gid).map(|entry| entry.info.clone())
    }

    /// All tasks, oldest first
    pub fn list(&self) -> Vec<TaskInfo> {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        let mut list: Vec<TaskInfo> = tasks.values().map(|entry| entry.info.clone()).collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.gid.cmp(&b.gid)));
        list
    }

    /// Tasks submitted by one user, oldest first
    pub fn list_for_user(&self, user_id: u64) -> Vec<TaskInfo> {
        self.list()
            .into_iter()
            .filter(|task| task.user_id == user_id)
            .collect()
    }

    /// Signal a task to stop
    ///
    /// # Returns
    /// * `true` if the task existed
    pub fn cancel(&self, gid: &str) -> bool {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        match tasks.get(gid) {
            Some(entry) => {
                entry.cancel.cancel();
                tracing::info!("Cancellation requested for task {}", gid);
                true
            }
            None => false,
        }
    }

    /// Cancel every task, or only those of one user
    ///
    /// # Returns
    /// * Number of tasks signalled
    pub fn cancel_all(&self, user_id: Option<u64>) -> usize {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        let mut count = 0;
        for entry in tasks.values() {
            if user_id.map_or(true, |uid| entry.info.user_id == uid) {
                entry.cancel.cancel();
                count += 1;
            }
        }
        tracing::info!("Cancellation requested for {} task(s)", count);
        count
    }

    pub fn remove(&self, gid: &str) -> Option<TaskInfo> {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        tasks.remove(gid).map(|entry| entry.info)
    }

    pub fn count(&self) -> usize {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        tasks.len()
    }

    /// Number of tasks in each state
    pub fn count_by_state(&self) -> HashMap<TaskState, usize> {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        let mut counts = HashMap::new();
        for entry in tasks.values() {
            *counts.entry(entry.info.state).or_insert(0) += 1;
        }
        counts
    }

    /// Wait for a queue slot
    ///
    /// # Returns
    /// * `Ok(None)` when the queue is unlimited
    /// * `Err(EngineError::Cancelled)` if the token fires while waiting
    pub async fn acquire(
        &self,
        phase: Phase,
        cancel: &CancellationToken,
    ) -> EngineResult<Option<OwnedSemaphorePermit>> {
        let semaphore = match phase {
            Phase::All => &self.all,
            Phase::Download => &self.download,
            Phase::Upload => &self.upload,
        };
        let Some(semaphore) = semaphore.clone() else {
            return Ok(None);
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            permit = semaphore.acquire_owned() => permit
                .map(Some)
                .map_err(|_| EngineError::Config("task queue closed".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn new_task(user_id: u64) -> NewTask {
        NewTask {
            name: "file.zip".to_string(),
            source: "https://example.com/file.zip".to_string(),
            target: UploadTarget::Telegram,
            user_id,
            chat_id: user_id as i64,
        }
    }

    #[test]
    fn test_register_and_get() {
        let registry = TaskRegistry::default();
        let handle = registry.register(new_task(1));
        let info = registry.get(&handle.gid).unwrap();
        assert_eq!(info.state, TaskState::Queued);
        assert_eq!(info.user_id, 1);
        assert_eq!(registry.count(), 1);

        registry.set_state(&handle.gid, TaskState::Downloading);
        registry.set_name(&handle.gid, "renamed.zip");
        let info = registry.get(&handle.gid).unwrap();
        assert_eq!(info.state, TaskState::Downloading);
        assert_eq!(info.name, "renamed.zip");

        assert!(registry.remove(&handle.gid).is_some());
        assert!(registry.get(&handle.gid).is_none());
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_gids_unique() {
        let registry = TaskRegistry::default();
        let a = registry.register(new_task(1));
        let b = registry.register(new_task(1));
        assert_ne!(a.gid, b.gid);
    }

    #[test]
    fn test_cancel() {
        let registry = TaskRegistry::default();
        let handle = registry.register(new_task(1));
        assert!(!handle.cancel.is_cancelled());
        assert!(registry.cancel(&handle.gid));
        assert!(handle.cancel.is_cancelled());
        assert!(!registry.cancel("0000000000000000"));
    }

    #[test]
    fn test_cancel_all_for_user() {
        let registry = TaskRegistry::default();
        let mine = registry.register(new_task(1));
        let theirs = registry.register(new_task(2));

        assert_eq!(registry.cancel_all(Some(1)), 1);
        assert!(mine.cancel.is_cancelled());
        assert!(!theirs.cancel.is_cancelled());

        assert_eq!(registry.cancel_all(None), 2);
        assert!(theirs.cancel.is_cancelled());
    }

    #[test]
    fn test_list_for_user_and_counts() {
        let registry = TaskRegistry::default();
        let a = registry.register(new_task(1));
        registry.register(new_task(2));
        registry.set_state(&a.gid, TaskState::Uploading);

        assert_eq!(registry.list().len(), 2);
        assert_eq!(registry.list_for_user(1).len(), 1);
        let counts = registry.count_by_state();
        assert_eq!(counts.get(&TaskState::Uploading), Some(&1));
        assert_eq!(counts.get(&TaskState::Queued), Some(&1));
    }

    #[tokio::test]
    async fn test_unlimited_queue() {
        let registry = TaskRegistry::default();
        let token = CancellationToken::new();
        assert!(registry.acquire(Phase::Download, &token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_queue_limits_concurrency() {
        let registry = TaskRegistry::new(QueueLimits {
            all: 1,
            download: 0,
            upload: 0,
        });
        let token = CancellationToken::new();
        let first = registry.acquire(Phase::All, &token).await.unwrap();
        assert!(first.is_some());

        let waiting = tokio::time::timeout(
            Duration::from_millis(50),
            registry.acquire(Phase::All, &token),
        )
        .await;
        assert!(waiting.is_err(), "second permit should block");

        drop(first);
        let second = tokio::time::timeout(
            Duration::from_millis(500),
            registry.acquire(Phase::All, &token),
        )
        .await
        .expect("permit after release");
        assert!(second.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_acquire_cancelled_while_waiting() {
        let registry = TaskRegistry::new(QueueLimits {
            all: 0,
            download: 1,
            upload: 0,
        });
        let holder = CancellationToken::new();
        let _held = registry.acquire(Phase::Download, &holder).await.unwrap();

        let token = CancellationToken::new();
        let waiter = {
            let registry = registry.clone();
            let token = token.clone();
            tokio::spawn(async move { registry.acquire(Phase::Download, &token).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }
}
