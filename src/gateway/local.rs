//! Local key-value backend.
//!
//! The whole collection (every owner) is one JSON array stored under a fixed
//! key, i.e. a single file. Each operation reads the array, edits it in
//! memory and writes it back; there is no indexing.
//!
//! Access is serialized twice: a tokio mutex orders operations from this
//! process, and a file lock covers the read-modify-write on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::gateway::{owned_by_due, TaskGateway};
use crate::lock::{read_if_exists, write_atomic, StoreLock};
use crate::task::{NewTask, Task, TaskPatch};

/// Backend storing the collection as one serialized array in a file.
#[derive(Debug, Clone)]
pub struct LocalGateway {
    path: PathBuf,
    lock_timeout_ms: u64,
    serial: Arc<Mutex<()>>,
}

impl LocalGateway {
    pub fn new(path: impl Into<PathBuf>, lock_timeout_ms: u64) -> Self {
        Self {
            path: path.into(),
            lock_timeout_ms,
            serial: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `edit` against the stored array under both locks, writing the
    /// array back only when `edit` succeeds.
    async fn with_collection<T, F>(&self, write: bool, edit: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Vec<Task>) -> Result<T> + Send + 'static,
    {
        let _serial = self.serial.lock().await;
        let path = self.path.clone();
        let timeout_ms = self.lock_timeout_ms;
        tokio::task::spawn_blocking(move || {
            let _lock = StoreLock::acquire(&path, timeout_ms)?;
            let mut tasks = read_collection(&path)?;
            let result = edit(&mut tasks)?;
            if write {
                write_atomic(&path, &serde_json::to_vec(&tasks)?)?;
            }
            Ok(result)
        })
        .await
        .map_err(|err| Error::Backend(format!("local store worker failed: {err}")))?
    }
}

fn read_collection(path: &Path) -> Result<Vec<Task>> {
    match read_if_exists(path)? {
        Some(data) if !data.iter().all(u8::is_ascii_whitespace) => {
            Ok(serde_json::from_slice(&data)?)
        }
        _ => Ok(Vec::new()),
    }
}

#[async_trait]
impl TaskGateway for LocalGateway {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn fetch_all(&self, owner: &str) -> Result<Vec<Task>> {
        let tasks = self
            .with_collection(false, |tasks| Ok(std::mem::take(tasks)))
            .await?;
        Ok(owned_by_due(tasks, owner))
    }

    async fn create(&self, task: NewTask) -> Result<Task> {
        task.validate()?;
        let created = task.into_task(Uuid::new_v4().to_string(), Utc::now());
        let stored = created.clone();
        self.with_collection(true, move |tasks| {
            tasks.push(stored);
            Ok(())
        })
        .await?;
        tracing::debug!(id = %created.id, path = %self.path.display(), "local task created");
        Ok(created)
    }

    async fn update(&self, id: &str, patch: &TaskPatch) -> Result<Task> {
        patch.validate()?;
        let id = id.to_string();
        let patch = patch.clone();
        self.with_collection(true, move |tasks| {
            let task = tasks
                .iter_mut()
                .find(|task| task.id == id)
                .ok_or_else(|| Error::NotFound(id.clone()))?;
            task.apply(&patch);
            Ok(task.clone())
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.with_collection(true, move |tasks| {
            let before = tasks.len();
            tasks.retain(|task| task.id != id);
            if tasks.len() == before {
                return Err(Error::NotFound(id));
            }
            Ok(())
        })
        .await
    }
}
