//! questlog - gamified task tracker core
//!
//! This library keeps a per-identity collection of tasks synchronized with
//! a persistence backend, derives filtered and sorted views plus an
//! experience level from it, and coordinates short-lived reward drops when
//! tasks are completed.
//!
//! # Core Concepts
//!
//! - **Gateway**: async CRUD over a local JSON file, a PostgREST-style
//!   remote table, or memory
//! - **Session**: the signed-in identity; every change resets the store
//! - **Task Store**: optimistic toggle/remove with rollback by reload
//! - **Views**: pure filter/sort/level/progress derivations
//! - **Rewards**: registry of in-flight completion animations
//!
//! # Module Organization
//!
//! - `cli`: Command-line interface using clap
//! - `config`: Configuration loading from `.questlog.toml`
//! - `error`: Error types and result aliases
//! - `events`: JSONL event stream for integrations
//! - `gateway`: Persistence backends
//! - `lock`: File locking and atomic writes for the local backend
//! - `output`: Human and JSON command output
//! - `reward`: Reward drop coordination
//! - `session`: Session provider
//! - `store`: Task store
//! - `task`: Task records, drafts and patches
//! - `view`: View derivation

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod lock;
pub mod output;
pub mod reward;
pub mod session;
pub mod store;
pub mod task;
pub mod view;

pub use error::{Error, Result};
pub use gateway::TaskGateway;
pub use session::{Session, SessionProvider};
pub use store::{MutationOutcome, MutationReport, TaskStore};
pub use task::{Category, Task, TaskDraft};
