//! Reward drop coordination.
//!
//! Completing a task spawns a short-lived reward event that the rendering
//! layer animates from the toggle's screen position to a landmark (the
//! "completed" counter). Lifecycle per event:
//!
//! ```text
//! Spawned -> Animating -> Completed (removed from the registry)
//! ```
//!
//! `Spawned -> Animating` happens as part of registration. The renderer
//! signals the end of the animation with [`RewardCoordinator::complete`].
//! Events carry no persistence and never affect task state.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

const NOTICE_CHANNEL_CAPACITY: usize = 64;

/// Unique id of one reward event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RewardId(Uuid);

impl RewardId {
    fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RewardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Screen-space coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Bounding box of the element that triggered a toggle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn center(&self) -> Point {
        Point::new(self.left + self.width / 2.0, self.top + self.height / 2.0)
    }
}

/// UI landmark a reward flies toward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    CompletedCounter,
    Named(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardPhase {
    Spawned,
    Animating,
}

/// A tracked reward event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewardEvent {
    pub id: RewardId,
    pub task_id: String,
    pub origin: Option<Point>,
    pub target: Anchor,
    pub phase: RewardPhase,
    #[serde(skip)]
    seq: u64,
}

/// What the rendering layer receives for a new drop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewardSignal {
    pub id: RewardId,
    #[serde(rename = "startX", skip_serializing_if = "Option::is_none")]
    pub start_x: Option<f64>,
    #[serde(rename = "startY", skip_serializing_if = "Option::is_none")]
    pub start_y: Option<f64>,
    pub target: Anchor,
}

impl From<&RewardEvent> for RewardSignal {
    fn from(event: &RewardEvent) -> Self {
        Self {
            id: event.id,
            start_x: event.origin.map(|p| p.x),
            start_y: event.origin.map(|p| p.y),
            target: event.target.clone(),
        }
    }
}

/// Lifecycle notices published to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum RewardNotice {
    Spawned(RewardSignal),
    Completed { id: RewardId },
}

/// Registry of in-flight reward events keyed by id.
#[derive(Debug)]
pub struct RewardCoordinator {
    events: HashMap<RewardId, RewardEvent>,
    target: Anchor,
    next_seq: u64,
    notices: broadcast::Sender<RewardNotice>,
}

impl Default for RewardCoordinator {
    fn default() -> Self {
        Self::new(Anchor::CompletedCounter)
    }
}

impl RewardCoordinator {
    /// Coordinator whose drops fly toward `target`.
    pub fn new(target: Anchor) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self {
            events: HashMap::new(),
            target,
            next_seq: 0,
            notices,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RewardNotice> {
        self.notices.subscribe()
    }

    /// Register a drop for `task_id` and start animating it.
    pub fn register(&mut self, task_id: impl Into<String>, origin: Option<Point>) -> RewardId {
        let mut event = RewardEvent {
            id: RewardId::fresh(),
            task_id: task_id.into(),
            origin,
            target: self.target.clone(),
            phase: RewardPhase::Spawned,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        event.phase = RewardPhase::Animating;

        let id = event.id;
        let signal = RewardSignal::from(&event);
        self.events.insert(id, event);
        // No subscribers is fine: the registry is the source of truth.
        let _ = self.notices.send(RewardNotice::Spawned(signal));
        id
    }

    /// The renderer finished animating `id`. Unknown ids are ignored.
    pub fn complete(&mut self, id: RewardId) -> Option<RewardEvent> {
        let removed = self.events.remove(&id)?;
        let _ = self.notices.send(RewardNotice::Completed { id });
        Some(removed)
    }

    pub fn get(&self, id: RewardId) -> Option<&RewardEvent> {
        self.events.get(&id)
    }

    /// Active events in spawn order.
    pub fn active(&self) -> Vec<RewardEvent> {
        let mut events: Vec<RewardEvent> = self.events.values().cloned().collect();
        events.sort_by_key(|event| event.seq);
        events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drop every tracked event without notifying.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}
