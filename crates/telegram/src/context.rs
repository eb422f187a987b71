//! Services shared by every handler, injected through dptree

use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use engine::{Config, Database, Downloader, DriveUploader, TaskRegistry};

use crate::auth;

/// Everything a handler needs besides the `Bot`
#[derive(Clone)]
pub struct BotContext {
    pub config: Arc<Config>,
    pub tasks: TaskRegistry,
    pub db: Option<Database>,
    pub drive: Option<DriveUploader>,
    pub downloader: Downloader,
    /// Users authorized with `/auth` while no database is configured
    pub authorized: Arc<RwLock<HashSet<u64>>>,
    pub started_at: Instant,
}

impl BotContext {
    pub fn new(
        config: Arc<Config>,
        tasks: TaskRegistry,
        db: Option<Database>,
        drive: Option<DriveUploader>,
        downloader: Downloader,
    ) -> Self {
        Self {
            config,
            tasks,
            db,
            drive,
            downloader,
            authorized: Arc::new(RwLock::new(HashSet::new())),
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn is_owner(&self, user_id: u64) -> bool {
        self.config.is_owner(user_id)
    }

    pub fn is_sudo(&self, user_id: u64) -> bool {
        self.config.is_sudo(user_id)
    }

    /// Whether a user may start and manage tasks in a chat
    ///
    /// The database is consulted only when the static rules reject.
    pub async fn is_authorized(&self, user_id: u64, chat_id: i64) -> bool {
        let granted = {
            let runtime = self.authorized.read().unwrap_or_else(|e| e.into_inner());
            auth::is_statically_authorized(&self.config, &runtime, user_id, chat_id)
        };
        if granted {
            return true;
        }

        match &self.db {
            Some(db) => match db.is_authorized(user_id).await {
                Ok(authorized) => authorized,
                Err(e) => {
                    tracing::error!("Authorization lookup failed for {}: {}", user_id, e);
                    false
                }
            },
            None => false,
        }
    }

    /// Grant access, persisting when a database is configured
    pub async fn authorize(&self, user_id: u64, by: u64) -> engine::EngineResult<()> {
        if let Some(db) = &self.db {
            db.authorize_user(user_id, by).await?;
        }
        self.authorized
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id);
        Ok(())
    }

    /// # Returns
    /// * `true` if the user had been authorized
    pub async fn unauthorize(&self, user_id: u64) -> engine::EngineResult<bool> {
        let mut removed = self
            .authorized
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&user_id);
        if let Some(db) = &self.db {
            removed |= db.unauthorize_user(user_id).await?;
        }
        Ok(removed)
    }

    /// Users authorized at runtime, sorted
    pub fn runtime_users(&self) -> Vec<u64> {
        let mut users: Vec<u64> = self
            .authorized
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .copied()
            .collect();
        users.sort_unstable();
        users
    }
}
