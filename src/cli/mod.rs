//! Command-line interface for questlog
//!
//! This module defines the CLI structure using clap derive macros and wires
//! the configured gateway, session provider and task store together.
//! Each group of subcommands lives in its own submodule.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{self, Config};
use crate::error::{Error, Result};
use crate::events::EventDestination;
use crate::gateway;
use crate::output::OutputOptions;
use crate::session::{LocalSessionProvider, SessionProvider};
use crate::store::TaskStore;
use crate::task::Category;
use crate::view::{DisplayMode, FilterMode, SortMode};

mod account;
mod board;
mod task;

/// questlog - a gamified task tracker
///
/// Track homework, exams and projects; completing tasks earns experience
/// and levels.
#[derive(Parser, Debug)]
#[command(name = "questlog")]
#[command(author, version, about = "questlog - a gamified task tracker", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory holding config, session and local task data
    #[arg(long, global = true, env = "QUESTLOG_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit store events as JSON lines to stdout ("-") or a file
    #[arg(long, global = true, value_name = "DEST")]
    pub events: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in with an email address
    Login {
        email: String,
    },

    /// Sign out and forget the stored session
    Logout,

    /// Show the signed-in identity
    Whoami,

    /// Add a task
    Add {
        /// Task title
        title: String,

        /// Longer description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Due date: YYYY-MM-DD, "YYYY-MM-DD HH:MM" or RFC 3339 (default: today 23:59)
        #[arg(long)]
        due: Option<String>,

        /// Category: homework, exam, project, personal
        #[arg(short, long, default_value_t = Category::default())]
        category: Category,
    },

    /// Edit a task; omitted fields keep their current value
    Edit {
        /// Task id
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long)]
        due: Option<String>,

        #[arg(short, long)]
        category: Option<Category>,
    },

    /// Flip a task between pending and completed
    Toggle {
        /// Task id
        id: String,
    },

    /// Delete a task
    #[command(alias = "remove")]
    Rm {
        /// Task id
        id: String,
    },

    /// List tasks
    #[command(alias = "ls")]
    List {
        /// all, pending, completed
        #[arg(short, long, default_value_t = FilterMode::default())]
        filter: FilterMode,

        /// due-ascending, due-descending, title-ascending
        #[arg(short, long, default_value_t = SortMode::default())]
        sort: SortMode,

        /// list or grid
        #[arg(long, default_value_t = DisplayMode::default())]
        view: DisplayMode,
    },

    /// Show level, progress and dashboard counters
    Stats,
}

impl Cli {
    /// Execute the CLI command
    pub async fn run(self) -> Result<()> {
        let output = OutputOptions {
            json: self.json,
            quiet: self.quiet,
        };
        let app = App::open(self.data_dir, self.events.as_deref()).await?;

        let result = match self.command {
            Commands::Login { email } => account::run_login(&app, &email, output).await,
            Commands::Logout => account::run_logout(&app, output).await,
            Commands::Whoami => account::run_whoami(&app, output),
            Commands::Add {
                title,
                description,
                due,
                category,
            } => {
                task::run_add(
                    &app,
                    task::AddOptions {
                        title,
                        description,
                        due,
                        category,
                    },
                    output,
                )
                .await
            }
            Commands::Edit {
                id,
                title,
                description,
                due,
                category,
            } => {
                task::run_edit(
                    &app,
                    task::EditOptions {
                        id,
                        title,
                        description,
                        due,
                        category,
                    },
                    output,
                )
                .await
            }
            Commands::Toggle { id } => task::run_toggle(&app, &id, output).await,
            Commands::Rm { id } => task::run_rm(&app, &id, output).await,
            Commands::List { filter, sort, view } => {
                board::run_list(&app, filter, sort, view, output)
            }
            Commands::Stats => board::run_stats(&app, output),
        };

        app.store.shutdown();
        result
    }
}

/// Wired-up components for a single command invocation.
pub(crate) struct App {
    pub data_dir: PathBuf,
    pub sessions: LocalSessionProvider,
    pub store: TaskStore,
}

impl App {
    async fn open(data_dir: Option<PathBuf>, events: Option<&str>) -> Result<Self> {
        let data_dir = data_dir.unwrap_or_else(config::default_data_dir);
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = Config::load_from_dir(&data_dir)?;
        let gateway = gateway::from_config(&config, &data_dir)?;
        let sessions = LocalSessionProvider::open(config.session_path(&data_dir)).await?;

        let store = TaskStore::new(gateway);
        if let Some(destination) = EventDestination::parse(events) {
            store.set_event_sink(destination.open()?);
        }
        tracing::debug!(
            data_dir = %data_dir.display(),
            backend = store.backend_name(),
            "opened questlog"
        );

        let app = Self {
            data_dir,
            sessions,
            store,
        };
        if let Some(session) = app.sessions.current() {
            app.store.set_session(Some(session)).await?;
        }
        Ok(app)
    }

    /// Owner id of the signed-in identity.
    pub fn require_session(&self) -> Result<String> {
        self.store.owner().ok_or(Error::NoSession)
    }
}
