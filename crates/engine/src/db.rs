//! MongoDB persistence for authorized users and task history

use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::{IndexOptions, UpdateOptions};
use mongodb::{Client, Collection, IndexModel};
use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::task::{TaskInfo, TaskState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: i64,
    pub authorized: bool,
    pub authorized_by: i64,
    pub authorized_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub user_id: i64,
    pub chat_id: i64,
    pub name: String,
    pub source: String,
    pub target: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TaskRecord {
    pub fn from_info(info: &TaskInfo) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            task_id: info.gid.clone(),
            user_id: info.user_id as i64,
            chat_id: info.chat_id,
            name: info.name.clone(),
            source: info.source.clone(),
            target: info.target.as_str().to_string(),
            status: info.state.as_str().to_string(),
            error: None,
            created_at: info.created_at.timestamp(),
            updated_at: now,
        }
    }
}

/// Handle to the bot's database
#[derive(Clone, Debug)]
pub struct Database {
    users: Collection<UserRecord>,
    tasks: Collection<TaskRecord>,
}

impl Database {
    /// Connect, verify with a ping and make sure indexes exist
    pub async fn connect(uri: &str, name: &str) -> EngineResult<Self> {
        let client = Client::with_uri_str(uri).await?;
        let db = client.database(name);
        db.run_command(doc! { "ping": 1 }, None).await?;

        let users = db.collection::<UserRecord>("users");
        let tasks = db.collection::<TaskRecord>("tasks");

        let unique = || IndexOptions::builder().unique(true).build();
        users
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "user_id": 1 })
                    .options(unique())
                    .build(),
                None,
            )
            .await?;
        tasks
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "task_id": 1 })
                    .options(unique())
                    .build(),
                None,
            )
            .await?;

        tracing::info!("Connected to MongoDB database {}", name);
        Ok(Self { users, tasks })
    }

    pub async fn authorize_user(&self, user_id: u64, by: u64) -> EngineResult<()> {
        let now = chrono::Utc::now().timestamp();
        self.users
            .update_one(
                user_filter(user_id),
                grant_update(by, now),
                UpdateOptions::builder().upsert(true).build(),
            )
            .await?;
        Ok(())
    }

    /// # Returns
    /// * `true` if a record was removed
    pub async fn unauthorize_user(&self, user_id: u64) -> EngineResult<bool> {
        let result = self
            .users
            .delete_one(user_filter(user_id), None)
            .await?;
        Ok(result.deleted_count > 0)
    }

    pub async fn is_authorized(&self, user_id: u64) -> EngineResult<bool> {
        let record = self
            .users
            .find_one(doc! { "user_id": user_id as i64, "authorized": true }, None)
            .await?;
        Ok(record.is_some())
    }

    pub async fn authorized_users(&self) -> EngineResult<Vec<UserRecord>> {
        let cursor = self.users.find(doc! { "authorized": true }, None).await?;
        Ok(cursor.try_collect().await?)
    }

    pub async fn record_task(&self, info: &TaskInfo) -> EngineResult<()> {
        let record = TaskRecord::from_info(info);
        self.tasks
            .update_one(
                doc! { "task_id": record.task_id.clone() },
                doc! {
                    "$set": {
                        "user_id": record.user_id,
                        "chat_id": record.chat_id,
                        "name": record.name,
                        "source": record.source,
                        "target": record.target,
                        "status": record.status,
                        "updated_at": record.updated_at,
                    },
                    "$setOnInsert": { "created_at": record.created_at },
                },
                UpdateOptions::builder().upsert(true).build(),
            )
            .await?;
        Ok(())
    }

    pub async fn update_task(
        &self,
        gid: &str,
        state: TaskState,
        name: &str,
        error: Option<&str>,
    ) -> EngineResult<()> {
        let update = task_update(state, name, error, chrono::Utc::now().timestamp());
        self.tasks
            .update_one(doc! { "task_id": gid }, update, None)
            .await?;
        Ok(())
    }

    /// Mark tasks left active by a previous run as interrupted
    ///
    /// # Returns
    /// * Number of tasks updated
    pub async fn interrupt_stale_tasks(&self) -> EngineResult<u64> {
        let result = self
            .tasks
            .update_many(
                stale_filter(),
                doc! { "$set": {
                    "status": TaskState::Interrupted.as_str(),
                    "updated_at": chrono::Utc::now().timestamp(),
                } },
                None,
            )
            .await?;
        if result.modified_count > 0 {
            tracing::info!("Marked {} stale task(s) as interrupted", result.modified_count);
        }
        Ok(result.modified_count)
    }
}

fn user_filter(user_id: u64) -> Document {
    doc! { "user_id": user_id as i64 }
}

fn grant_update(by: u64, now: i64) -> Document {
    doc! { "$set": {
        "authorized": true,
        "authorized_by": by as i64,
        "authorized_at": now,
    } }
}

fn task_update(state: TaskState, name: &str, error: Option<&str>, now: i64) -> Document {
    let mut set = doc! {
        "status": state.as_str(),
        "name": name,
        "updated_at": now,
    };
    if let Some(error) = error {
        set.insert("error", error);
    }
    doc! { "$set": set }
}

/// Tasks a previous run left in an active state
fn stale_filter() -> Document {
    doc! { "status": { "$in": TaskState::active_names().to_vec() } }
}
