//! Task store: the in-memory collection for the signed-in identity.
//!
//! Mutations go through the persistence gateway with two policies:
//!
//! - `add` and `edit` wait for the backend and only then touch local state.
//!   On failure local state is unchanged.
//! - `toggle` and `remove` apply locally first, then confirm. On failure the
//!   store reloads from the backend (rollback by reload, not field undo).
//!
//! Each optimistic mutation is tracked as a [`PendingOp`] until the backend
//! answers, and ends as [`MutationOutcome::Confirmed`] or
//! [`MutationOutcome::RolledBack`].
//!
//! # Overlapping mutations
//!
//! The store does not serialize mutations on the same task. Two quick
//! toggles of one id race: if the first confirmation fails, its reload can
//! overwrite the second toggle's optimistic value. This is a known
//! limitation. Loads always replace the whole collection; the last load to
//! resolve wins.
//!
//! # Sessions and teardown
//!
//! Every session change bumps an epoch and clears local state. Results of
//! backend calls started under an older epoch, or after [`TaskStore::shutdown`],
//! are dropped instead of applied.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::events::{Event, EventKind, EventSink};
use crate::gateway::TaskGateway;
use crate::reward::{Point, RewardCoordinator, RewardEvent, RewardId, RewardNotice};
use crate::session::{Session, SessionProvider};
use crate::task::{NewTask, Task, TaskDraft, TaskPatch};
use crate::view::{self, DashboardStats, Progress, View, ViewOptions};

/// Where an optimistic mutation stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum MutationOutcome {
    AppliedOptimistically,
    Confirmed,
    RolledBack(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Toggle,
    Remove,
}

/// An optimistic mutation awaiting backend confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingOp {
    pub op_id: u64,
    pub kind: MutationKind,
    pub task_id: String,
    pub outcome: MutationOutcome,
}

/// Result of an optimistic mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationReport {
    pub op_id: u64,
    pub kind: MutationKind,
    pub task_id: String,
    pub outcome: MutationOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward: Option<RewardId>,
}

impl MutationReport {
    pub fn is_confirmed(&self) -> bool {
        self.outcome == MutationOutcome::Confirmed
    }

    pub fn rollback_reason(&self) -> Option<&str> {
        match &self.outcome {
            MutationOutcome::RolledBack(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Identity and epoch an operation started under.
struct Ticket {
    owner: String,
    epoch: u64,
}

#[derive(Default)]
struct StoreState {
    owner: Option<String>,
    tasks: Vec<Task>,
    loads_in_flight: usize,
    epoch: u64,
    closed: bool,
    rewards: RewardCoordinator,
    pending: Vec<PendingOp>,
    next_op: u64,
}

impl StoreState {
    fn ticket(&self) -> Result<Ticket> {
        if self.closed {
            return Err(Error::StoreClosed);
        }
        let owner = self.owner.clone().ok_or(Error::NoSession)?;
        Ok(Ticket {
            owner,
            epoch: self.epoch,
        })
    }

    fn is_current(&self, ticket: &Ticket) -> bool {
        !self.closed && self.epoch == ticket.epoch
    }

    fn begin(&mut self, kind: MutationKind, task_id: &str) -> u64 {
        self.next_op += 1;
        self.pending.push(PendingOp {
            op_id: self.next_op,
            kind,
            task_id: task_id.to_string(),
            outcome: MutationOutcome::AppliedOptimistically,
        });
        self.next_op
    }

    fn finish_load(&mut self, ticket: &Ticket) {
        if self.epoch == ticket.epoch {
            self.loads_in_flight = self.loads_in_flight.saturating_sub(1);
        }
    }
}

struct Inner {
    gateway: Arc<dyn TaskGateway>,
    state: Mutex<StoreState>,
    revision: watch::Sender<u64>,
    events: Mutex<Option<EventSink>>,
}

/// Single source of truth for the active identity's tasks.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct TaskStore {
    inner: Arc<Inner>,
}

impl TaskStore {
    pub fn new(gateway: Arc<dyn TaskGateway>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                gateway,
                state: Mutex::new(StoreState::default()),
                revision,
                events: Mutex::new(None),
            }),
        }
    }

    /// Mirror store and reward events to `sink` as JSON lines.
    pub fn set_event_sink(&self, sink: EventSink) {
        *self
            .inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self) {
        self.inner.revision.send_modify(|revision| *revision += 1);
    }

    fn emit<T: Serialize>(&self, kind: EventKind, owner: Option<&str>, data: T) {
        let mut events = self
            .inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(sink) = events.as_mut() else {
            return;
        };
        let result = Event::new(kind, owner.map(str::to_string))
            .with_data(data)
            .and_then(|event| sink.emit(&event));
        if let Err(err) = result {
            tracing::warn!(error = %err, ?kind, "failed to emit event");
        }
    }

    // =========================================================================
    // Session lifecycle
    // =========================================================================

    /// Switch identity: clear everything, then load for the new owner.
    pub async fn set_session(&self, session: Option<Session>) -> Result<()> {
        let owner = session.as_ref().map(|session| session.id.clone());
        {
            let mut state = self.state();
            if state.closed {
                return Ok(());
            }
            state.epoch += 1;
            state.owner = owner.clone();
            state.tasks.clear();
            state.pending.clear();
            state.rewards.clear();
            state.loads_in_flight = 0;
        }
        self.touch();
        tracing::debug!(owner = owner.as_deref().unwrap_or("-"), "session changed");
        self.emit(
            EventKind::SessionChanged,
            owner.as_deref(),
            serde_json::json!({ "email": session.as_ref().map(|s| s.email.as_str()) }),
        );

        match owner {
            Some(_) => self.load().await.map(|_| ()),
            None => Ok(()),
        }
    }

    /// Follow `provider`: apply its current session now, then every change.
    ///
    /// The subscription lives as long as the returned binding.
    pub fn bind(&self, provider: &dyn SessionProvider) -> StoreBinding {
        let mut rx = provider.subscribe();
        let store = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                let session = rx.borrow_and_update().clone();
                if let Err(err) = store.set_session(session).await {
                    tracing::warn!(error = %err, "load after session change failed");
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });
        StoreBinding {
            handle: Some(handle),
        }
    }

    /// Stop applying backend results. Later mutations fail with `StoreClosed`.
    pub fn shutdown(&self) {
        {
            let mut state = self.state();
            state.closed = true;
            state.pending.clear();
            state.rewards.clear();
        }
        self.touch();
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Replace the collection with the backend's copy for the current owner.
    ///
    /// On failure the collection is left empty and the error returned.
    /// Returns the number of tasks fetched.
    pub async fn load(&self) -> Result<usize> {
        let ticket = {
            let mut state = self.state();
            let ticket = state.ticket()?;
            state.loads_in_flight += 1;
            ticket
        };
        self.touch();
        tracing::debug!(
            owner = %ticket.owner,
            backend = self.inner.gateway.name(),
            "loading tasks"
        );

        let fetched = self.inner.gateway.fetch_all(&ticket.owner).await;
        let tasks = match fetched {
            Ok(tasks) => tasks,
            Err(err) => {
                {
                    let mut state = self.state();
                    state.finish_load(&ticket);
                    if state.is_current(&ticket) {
                        state.tasks.clear();
                    }
                }
                self.touch();
                tracing::warn!(error = %err, "failed to load tasks");
                return Err(err);
            }
        };

        let count = tasks.len();
        let applied = {
            let mut state = self.state();
            state.finish_load(&ticket);
            let current = state.is_current(&ticket);
            if current {
                state.tasks = tasks;
            }
            current
        };
        self.touch();
        if applied {
            self.emit(
                EventKind::TasksLoaded,
                Some(ticket.owner.as_str()),
                serde_json::json!({ "count": count }),
            );
        } else {
            tracing::debug!("discarding load for a previous session");
        }
        Ok(count)
    }

    /// Create a task from `draft`. Local state changes only after the
    /// backend returns the canonical record.
    pub async fn add(&self, draft: TaskDraft) -> Result<Task> {
        draft.validate()?;
        let ticket = self.state().ticket()?;

        let new_task = NewTask::from_draft(&ticket.owner, &draft);
        let created = match self.inner.gateway.create(new_task).await {
            Ok(created) => created,
            Err(err) => {
                tracing::warn!(error = %err, title = %draft.title, "failed to add task");
                return Err(err);
            }
        };

        let applied = {
            let mut state = self.state();
            let current = state.is_current(&ticket);
            if current {
                state.tasks.push(created.clone());
            }
            current
        };
        if applied {
            self.touch();
            self.emit(EventKind::TaskCreated, Some(ticket.owner.as_str()), &created);
        }
        Ok(created)
    }

    /// Replace every editable field of `id`. Local state changes only after
    /// the backend confirms.
    pub async fn edit(&self, id: &str, draft: TaskDraft) -> Result<Task> {
        draft.validate()?;
        let ticket = {
            let state = self.state();
            let ticket = state.ticket()?;
            if !state.tasks.iter().any(|task| task.id == id) {
                return Err(Error::NotFound(id.to_string()));
            }
            ticket
        };

        let updated = match self.inner.gateway.update(id, &draft.to_patch()).await {
            Ok(updated) => updated,
            Err(err) => {
                tracing::warn!(error = %err, task = id, "failed to edit task");
                return Err(err);
            }
        };

        let applied = {
            let mut state = self.state();
            let current = state.is_current(&ticket);
            if current {
                if let Some(slot) = state.tasks.iter_mut().find(|task| task.id == updated.id) {
                    *slot = updated.clone();
                }
            }
            current
        };
        if applied {
            self.touch();
            self.emit(EventKind::TaskEdited, Some(ticket.owner.as_str()), &updated);
        }
        Ok(updated)
    }

    /// Flip `completed` locally, then confirm with the backend.
    ///
    /// `current_completed` is the state the caller saw. Going from
    /// incomplete to complete registers a reward drop starting at `origin`.
    /// A failed confirmation reloads the collection and reports
    /// [`MutationOutcome::RolledBack`].
    pub async fn toggle(
        &self,
        id: &str,
        current_completed: bool,
        origin: Option<Point>,
    ) -> Result<MutationReport> {
        let completed = !current_completed;
        let (ticket, op_id, reward) = {
            let mut state = self.state();
            let ticket = state.ticket()?;
            let task = state
                .tasks
                .iter_mut()
                .find(|task| task.id == id)
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            task.completed = completed;
            let reward = if current_completed {
                None
            } else {
                Some(state.rewards.register(id, origin))
            };
            let op_id = state.begin(MutationKind::Toggle, id);
            (ticket, op_id, reward)
        };
        self.touch();
        self.emit(
            EventKind::TaskToggled,
            Some(ticket.owner.as_str()),
            serde_json::json!({ "id": id, "completed": completed }),
        );
        if let Some(reward) = reward {
            self.emit(
                EventKind::RewardSpawned,
                Some(ticket.owner.as_str()),
                serde_json::json!({ "id": reward, "task_id": id, "origin": origin }),
            );
        }

        let confirmed = self
            .inner
            .gateway
            .update(id, &TaskPatch::completed(completed))
            .await;
        let outcome = match confirmed {
            Ok(_) => MutationOutcome::Confirmed,
            Err(err) => {
                tracing::warn!(error = %err, task = id, "toggle not confirmed; reloading");
                MutationOutcome::RolledBack(err.to_string())
            }
        };
        Ok(self
            .finish(&ticket, op_id, MutationKind::Toggle, id, outcome, reward)
            .await)
    }

    /// Remove `id` locally, then delete it from the backend.
    ///
    /// Removing an id that is not in the collection fails with `NotFound`
    /// and changes nothing. A failed delete reloads the collection.
    pub async fn remove(&self, id: &str) -> Result<MutationReport> {
        let (ticket, op_id) = {
            let mut state = self.state();
            let ticket = state.ticket()?;
            let before = state.tasks.len();
            state.tasks.retain(|task| task.id != id);
            if state.tasks.len() == before {
                return Err(Error::NotFound(id.to_string()));
            }
            let op_id = state.begin(MutationKind::Remove, id);
            (ticket, op_id)
        };
        self.touch();
        self.emit(
            EventKind::TaskDeleted,
            Some(ticket.owner.as_str()),
            serde_json::json!({ "id": id }),
        );

        let outcome = match self.inner.gateway.delete(id).await {
            Ok(()) => MutationOutcome::Confirmed,
            Err(err) => {
                tracing::warn!(error = %err, task = id, "delete not confirmed; reloading");
                MutationOutcome::RolledBack(err.to_string())
            }
        };
        Ok(self
            .finish(&ticket, op_id, MutationKind::Remove, id, outcome, None)
            .await)
    }

    async fn finish(
        &self,
        ticket: &Ticket,
        op_id: u64,
        kind: MutationKind,
        task_id: &str,
        outcome: MutationOutcome,
        reward: Option<RewardId>,
    ) -> MutationReport {
        let current = {
            let mut state = self.state();
            state.pending.retain(|op| op.op_id != op_id);
            state.is_current(ticket)
        };
        self.touch();

        let report = MutationReport {
            op_id,
            kind,
            task_id: task_id.to_string(),
            outcome,
            reward,
        };
        let event = match report.outcome {
            MutationOutcome::RolledBack(_) => EventKind::MutationRolledBack,
            _ => EventKind::MutationConfirmed,
        };
        self.emit(event, Some(ticket.owner.as_str()), &report);

        if report.rollback_reason().is_some() && current {
            if let Err(err) = self.load().await {
                tracing::warn!(error = %err, "reload after rollback failed");
            }
        }
        report
    }

    // =========================================================================
    // Read access
    // =========================================================================

    /// Copy of the collection in backend order plus local appends.
    pub fn tasks(&self) -> Vec<Task> {
        self.state().tasks.clone()
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.state().tasks.iter().find(|task| task.id == id).cloned()
    }

    pub fn owner(&self) -> Option<String> {
        self.state().owner.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state().loads_in_flight > 0
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner.gateway.name()
    }

    pub fn progress(&self) -> Progress {
        Progress::from_tasks(&self.state().tasks)
    }

    pub fn stats(&self) -> DashboardStats {
        DashboardStats::today(&self.state().tasks)
    }

    pub fn view(&self, options: ViewOptions) -> View {
        view::project(&self.state().tasks, options)
    }

    /// Optimistic mutations still waiting on the backend.
    pub fn pending_ops(&self) -> Vec<PendingOp> {
        self.state().pending.clone()
    }

    /// Revision counter bumped on every state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    // =========================================================================
    // Rewards
    // =========================================================================

    pub fn active_rewards(&self) -> Vec<RewardEvent> {
        self.state().rewards.active()
    }

    pub fn subscribe_rewards(&self) -> broadcast::Receiver<RewardNotice> {
        self.state().rewards.subscribe()
    }

    /// The renderer finished animating `id`.
    pub fn complete_reward(&self, id: RewardId) -> Option<RewardEvent> {
        let (removed, owner) = {
            let mut state = self.state();
            let removed = state.rewards.complete(id);
            (removed, state.owner.clone())
        };
        if removed.is_some() {
            self.emit(
                EventKind::RewardCompleted,
                owner.as_deref(),
                serde_json::json!({ "id": id }),
            );
        }
        removed
    }
}

/// Live subscription of a [`TaskStore`] to a session provider.
///
/// Dropping the binding disposes the subscription.
pub struct StoreBinding {
    handle: Option<JoinHandle<()>>,
}

impl StoreBinding {
    pub fn is_active(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Dispose the subscription and wait for the watcher to stop.
    pub async fn unbind(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for StoreBinding {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use crate::session::identity_for;

    fn session(email: &str) -> Session {
        Session {
            id: identity_for(email),
            email: email.to_string(),
        }
    }

    async fn signed_in_store() -> (TaskStore, Arc<MemoryGateway>) {
        let gateway = Arc::new(MemoryGateway::new());
        let store = TaskStore::new(gateway.clone());
        store
            .set_session(Some(session("steve@example.com")))
            .await
            .unwrap();
        (store, gateway)
    }

    #[tokio::test]
    async fn operations_need_a_session() {
        let store = TaskStore::new(Arc::new(MemoryGateway::new()));
        assert!(matches!(store.load().await, Err(Error::NoSession)));
        assert!(matches!(
            store.add(TaskDraft::new("Quest")).await,
            Err(Error::NoSession)
        ));
    }

    #[tokio::test]
    async fn add_appends_canonical_record() {
        let (store, gateway) = signed_in_store().await;
        let created = store.add(TaskDraft::new("Mine diamonds")).await.unwrap();

        assert_eq!(store.tasks(), vec![created.clone()]);
        assert_eq!(created.owner, identity_for("steve@example.com"));
        assert!(!created.completed);
        assert_eq!(gateway.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn invalid_draft_never_reaches_backend() {
        let (store, gateway) = signed_in_store().await;
        let err = store.add(TaskDraft::new("  ")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(store.tasks().is_empty());
        assert!(gateway.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn completing_registers_one_reward() {
        let (store, _) = signed_in_store().await;
        let task = store.add(TaskDraft::new("Craft table")).await.unwrap();

        let report = store
            .toggle(&task.id, false, Some(Point::new(4.0, 8.0)))
            .await
            .unwrap();
        assert!(report.is_confirmed());
        let reward = report.reward.unwrap();
        let active = store.active_rewards();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, reward);
        assert_eq!(active[0].task_id, task.id);

        let report = store.toggle(&task.id, true, None).await.unwrap();
        assert!(report.reward.is_none());
        assert_eq!(store.active_rewards().len(), 1);

        assert!(store.complete_reward(reward).is_some());
        assert!(store.active_rewards().is_empty());
        assert!(store.pending_ops().is_empty());
    }

    #[tokio::test]
    async fn sign_out_clears_collection() {
        let (store, _) = signed_in_store().await;
        store.add(TaskDraft::new("Secret quest")).await.unwrap();

        store.set_session(None).await.unwrap();
        assert!(store.tasks().is_empty());
        assert!(store.owner().is_none());
    }

    #[tokio::test]
    async fn shutdown_rejects_further_mutations() {
        let (store, _) = signed_in_store().await;
        store.shutdown();
        assert!(store.is_closed());
        assert!(matches!(
            store.add(TaskDraft::new("Too late")).await,
            Err(Error::StoreClosed)
        ));
    }

    #[tokio::test]
    async fn revision_moves_on_change() {
        let (store, _) = signed_in_store().await;
        let rx = store.subscribe();
        let before = *rx.borrow();
        store.add(TaskDraft::new("Quest")).await.unwrap();
        assert!(*rx.borrow() > before);
    }
}
