//! Persistence gateway: one CRUD contract over interchangeable backends.
//!
//! - `local`: the whole collection as one serialized array in a file
//! - `remote`: a REST record service filtered by owner, ordered by due date
//! - `memory`: in-process only, for tests and embedding
//!
//! Every backend returns `fetch_all` results for a single owner, ordered by
//! due date ascending. Failures map onto [`Error::Validation`],
//! [`Error::NotFound`] or a backend-class error.
//!
//! [`Error::Validation`]: crate::error::Error::Validation
//! [`Error::NotFound`]: crate::error::Error::NotFound

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{BackendKind, Config};
use crate::error::Result;
use crate::task::{NewTask, Task, TaskPatch};

pub mod local;
pub mod memory;
pub mod remote;

pub use local::LocalGateway;
pub use memory::MemoryGateway;
pub use remote::RemoteGateway;

/// Uniform CRUD contract for task records.
#[async_trait]
pub trait TaskGateway: Send + Sync {
    /// Short backend name for logs and output.
    fn name(&self) -> &'static str;

    /// All tasks owned by `owner`, ordered by due date ascending.
    async fn fetch_all(&self, owner: &str) -> Result<Vec<Task>>;

    /// Persist a new task; the backend assigns `id` and `created_at`.
    async fn create(&self, task: NewTask) -> Result<Task>;

    /// Apply a partial update and return the stored record.
    async fn update(&self, id: &str, patch: &TaskPatch) -> Result<Task>;

    /// Remove a task. Fails with `NotFound` when the id is absent.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Build the gateway selected by `config`.
pub fn from_config(config: &Config, data_dir: &Path) -> Result<Arc<dyn TaskGateway>> {
    match config.backend.kind {
        BackendKind::Local => Ok(Arc::new(LocalGateway::new(
            config.local_store_path(data_dir),
            config.local.lock_timeout_ms,
        ))),
        BackendKind::Remote => Ok(Arc::new(RemoteGateway::from_config(&config.remote)?)),
    }
}

/// Keep `owner`'s tasks and order them by due instant (stable).
pub(crate) fn owned_by_due(tasks: impl IntoIterator<Item = Task>, owner: &str) -> Vec<Task> {
    let mut owned: Vec<Task> = tasks
        .into_iter()
        .filter(|task| task.owner == owner)
        .collect();
    owned.sort_by(|left, right| left.due.cmp(&right.due));
    owned
}
