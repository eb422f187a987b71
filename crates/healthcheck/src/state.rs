//! Shared state read by the health endpoints

use engine::TaskRegistry;
use std::time::Instant;

/// State handed to every request
#[derive(Clone, Debug)]
pub struct HealthState {
    started_at: Instant,
    tasks: TaskRegistry,
}

impl HealthState {
    pub fn new(tasks: TaskRegistry) -> Self {
        Self::with_start(tasks, Instant::now())
    }

    /// Use an existing process start time
    pub fn with_start(tasks: TaskRegistry, started_at: Instant) -> Self {
        Self { started_at, tasks }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Tasks currently registered (queued or running)
    pub fn active_tasks(&self) -> usize {
        self.tasks.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::{NewTask, UploadTarget};
    use std::time::Duration;

    #[test]
    fn test_counts_registered_tasks() {
        let tasks = TaskRegistry::default();
        let state = HealthState::new(tasks.clone());
        assert_eq!(state.active_tasks(), 0);

        let handle = tasks.register(NewTask {
            name: "a".to_string(),
            source: "https://example.com/a".to_string(),
            target: UploadTarget::Telegram,
            user_id: 1,
            chat_id: 1,
        });
        assert_eq!(state.active_tasks(), 1);

        tasks.remove(&handle.gid);
        assert_eq!(state.active_tasks(), 0);
    }

    #[test]
    fn test_uptime_from_given_start() {
        let start = Instant::now() - Duration::from_secs(90);
        let state = HealthState::with_start(TaskRegistry::default(), start);
        assert!(state.uptime_seconds() >= 90);
    }
}
