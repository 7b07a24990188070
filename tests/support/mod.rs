#![allow(dead_code)]

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use questlog::gateway::MemoryGateway;
use questlog::session::identity_for;
use questlog::task::{Category, NewTask, Task, TaskPatch};
use questlog::{Error, Result, Session, TaskGateway};
use tokio::sync::Notify;

/// Memory backend with switchable failures and a pausable update path.
#[derive(Default)]
pub struct ScriptedGateway {
    pub inner: MemoryGateway,
    fail_fetch: AtomicBool,
    fail_create: AtomicBool,
    fail_update: AtomicBool,
    fail_delete: AtomicBool,
    hold_updates: AtomicBool,
    release: Notify,
    update_parked: Notify,
    hold_fetches: AtomicBool,
    release_fetch: Notify,
    fetch_parked: Notify,
    fetches: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seeded(tasks: Vec<Task>) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryGateway::with_tasks(tasks),
            ..Self::default()
        })
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_update(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    /// Park every update until [`ScriptedGateway::release_update`].
    pub fn hold_updates(&self, hold: bool) {
        self.hold_updates.store(hold, Ordering::SeqCst);
    }

    pub fn release_update(&self) {
        self.release.notify_one();
    }

    /// Resolves once an update is parked.
    pub async fn update_parked(&self) {
        self.update_parked.notified().await;
    }

    /// Park every fetch until [`ScriptedGateway::release_fetch`].
    pub fn hold_fetches(&self, hold: bool) {
        self.hold_fetches.store(hold, Ordering::SeqCst);
    }

    pub fn release_fetch(&self) {
        self.release_fetch.notify_one();
    }

    /// Resolves once a fetch is parked.
    pub async fn fetch_parked(&self) {
        self.fetch_parked.notified().await;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn scripted_failure(flag: &AtomicBool, action: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(Error::Backend(format!("{action} failed: HTTP 503: unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskGateway for ScriptedGateway {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch_all(&self, owner: &str) -> Result<Vec<Task>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.hold_fetches.load(Ordering::SeqCst) {
            self.fetch_parked.notify_one();
            self.release_fetch.notified().await;
        }
        Self::scripted_failure(&self.fail_fetch, "fetch")?;
        self.inner.fetch_all(owner).await
    }

    async fn create(&self, task: NewTask) -> Result<Task> {
        Self::scripted_failure(&self.fail_create, "create")?;
        self.inner.create(task).await
    }

    async fn update(&self, id: &str, patch: &TaskPatch) -> Result<Task> {
        if self.hold_updates.load(Ordering::SeqCst) {
            self.update_parked.notify_one();
            self.release.notified().await;
        }
        Self::scripted_failure(&self.fail_update, "update")?;
        self.inner.update(id, patch).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        Self::scripted_failure(&self.fail_delete, "delete")?;
        self.inner.delete(id).await
    }
}

/// Cloneable in-memory writer for capturing event lines.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// Captured JSON lines, parsed.
    pub fn lines(&self) -> Vec<serde_json::Value> {
        let bytes = self.0.lock().expect("buffer lock").clone();
        String::from_utf8(bytes)
            .expect("utf-8 events")
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub fn session(email: &str) -> Session {
    Session {
        id: identity_for(email),
        email: email.to_string(),
    }
}

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// Stored record for `owner`, due `day` days after 2025-03-01.
pub fn task(owner: &str, id: &str, title: &str, day: i64, completed: bool) -> Task {
    let due = at(1, 12) + Duration::days(day);
    Task {
        id: id.to_string(),
        owner: owner.to_string(),
        title: title.to_string(),
        description: String::new(),
        due,
        category: Category::Homework,
        completed,
        created_at: at(1, 0),
    }
}
