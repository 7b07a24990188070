//! In-memory backend (for testing and embedding)

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::gateway::{owned_by_due, TaskGateway};
use crate::task::{NewTask, Task, TaskPatch};

/// Backend holding records in process memory only.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    tasks: RwLock<Vec<Task>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the backend with existing records.
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks: RwLock::new(tasks),
        }
    }

    /// Every stored record, all owners, in insertion order.
    pub async fn snapshot(&self) -> Vec<Task> {
        self.tasks.read().await.clone()
    }
}

#[async_trait]
impl TaskGateway for MemoryGateway {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn fetch_all(&self, owner: &str) -> Result<Vec<Task>> {
        let tasks = self.tasks.read().await;
        Ok(owned_by_due(tasks.iter().cloned(), owner))
    }

    async fn create(&self, task: NewTask) -> Result<Task> {
        task.validate()?;
        let created = task.into_task(Uuid::new_v4().to_string(), Utc::now());
        self.tasks.write().await.push(created.clone());
        Ok(created)
    }

    async fn update(&self, id: &str, patch: &TaskPatch) -> Result<Task> {
        patch.validate()?;
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        task.apply(patch);
        Ok(task.clone())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|task| task.id != id);
        if tasks.len() == before {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }
}
