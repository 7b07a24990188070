//! Derived views over a task collection.
//!
//! Everything here is a pure function of its inputs: filtering, sorting,
//! the level/progress pair and dashboard counters. Callers recompute on
//! demand after every store change.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDate, TimeZone};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::task::Task;

/// Completed tasks needed per level.
pub const TASKS_PER_LEVEL: usize = 5;

/// Minimum number of cells shown in the grid ("inventory") layout.
pub const INVENTORY_SLOTS: usize = 27;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    #[default]
    All,
    Pending,
    Completed,
}

impl FilterMode {
    pub fn keeps(self, task: &Task) -> bool {
        match self {
            FilterMode::All => true,
            FilterMode::Pending => !task.completed,
            FilterMode::Completed => task.completed,
        }
    }
}

impl FromStr for FilterMode {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(FilterMode::All),
            "pending" | "open" => Ok(FilterMode::Pending),
            "completed" | "done" => Ok(FilterMode::Completed),
            other => Err(Error::InvalidArgument(format!(
                "unknown filter '{other}' (expected all, pending or completed)"
            ))),
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FilterMode::All => "all",
            FilterMode::Pending => "pending",
            FilterMode::Completed => "completed",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortMode {
    #[default]
    DueAscending,
    DueDescending,
    TitleAscending,
}

impl FromStr for SortMode {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "due-ascending" | "date-asc" | "due" => Ok(SortMode::DueAscending),
            "due-descending" | "date-desc" => Ok(SortMode::DueDescending),
            "title-ascending" | "title-asc" | "title" => Ok(SortMode::TitleAscending),
            other => Err(Error::InvalidArgument(format!(
                "unknown sort '{other}' (expected due-ascending, due-descending or title-ascending)"
            ))),
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortMode::DueAscending => "due-ascending",
            SortMode::DueDescending => "due-descending",
            SortMode::TitleAscending => "title-ascending",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    #[default]
    List,
    Grid,
}

impl FromStr for DisplayMode {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "list" => Ok(DisplayMode::List),
            "grid" | "inventory" => Ok(DisplayMode::Grid),
            other => Err(Error::InvalidArgument(format!(
                "unknown view '{other}' (expected list or grid)"
            ))),
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DisplayMode::List => "list",
            DisplayMode::Grid => "grid",
        })
    }
}

/// User-selected presentation options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ViewOptions {
    pub filter: FilterMode,
    pub sort: SortMode,
    pub display: DisplayMode,
}

/// Filter then sort a collection. The input is left untouched.
pub fn derive_tasks(tasks: &[Task], filter: FilterMode, sort: SortMode) -> Vec<Task> {
    let mut derived: Vec<Task> = tasks
        .iter()
        .filter(|task| filter.keeps(task))
        .cloned()
        .collect();
    sort_tasks(&mut derived, sort);
    derived
}

/// Stable sort in place. Due dates compare as absolute instants.
pub fn sort_tasks(tasks: &mut [Task], sort: SortMode) {
    match sort {
        SortMode::DueAscending => tasks.sort_by(|left, right| left.due.cmp(&right.due)),
        SortMode::DueDescending => tasks.sort_by(|left, right| right.due.cmp(&left.due)),
        SortMode::TitleAscending => {
            tasks.sort_by(|left, right| compare_titles(&left.title, &right.title))
        }
    }
}

/// Collation-style title order: case-insensitive first, then lowercase
/// before uppercase. Identical strings compare equal.
pub fn compare_titles(left: &str, right: &str) -> Ordering {
    let folded = left
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(right.chars().flat_map(char::to_lowercase));
    folded.then_with(|| case_order(left, right))
}

fn case_order(left: &str, right: &str) -> Ordering {
    for (l, r) in left.chars().zip(right.chars()) {
        if l == r {
            continue;
        }
        return match (l.is_lowercase(), r.is_lowercase()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => l.cmp(&r),
        };
    }
    left.chars().count().cmp(&right.chars().count())
}

/// Experience level and progress toward the next one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    pub level: u32,
    /// Percentage in `[0, 100)`.
    pub progress: f64,
    pub completed: usize,
}

impl Progress {
    pub fn from_completed(completed: usize) -> Self {
        Self {
            level: level(completed),
            progress: progress(completed),
            completed,
        }
    }

    pub fn from_tasks(tasks: &[Task]) -> Self {
        Self::from_completed(tasks.iter().filter(|task| task.completed).count())
    }
}

/// `floor(completed / 5) + 1`
pub fn level(completed: usize) -> u32 {
    u32::try_from(completed / TASKS_PER_LEVEL)
        .unwrap_or(u32::MAX - 1)
        .saturating_add(1)
}

/// `(completed mod 5) / 5 * 100`
pub fn progress(completed: usize) -> f64 {
    (completed % TASKS_PER_LEVEL) as f64 / TASKS_PER_LEVEL as f64 * 100.0
}

/// Dashboard counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub due_today: usize,
}

impl DashboardStats {
    /// Counters with "today" taken from the local clock.
    pub fn today(tasks: &[Task]) -> Self {
        Self::on(tasks, Local::now().date_naive(), &Local)
    }

    /// Counters where `due_today` means due on `day` in `tz`.
    pub fn on<Tz: TimeZone>(tasks: &[Task], day: NaiveDate, tz: &Tz) -> Self {
        let completed = tasks.iter().filter(|task| task.completed).count();
        let due_today = tasks
            .iter()
            .filter(|task| task.due.with_timezone(tz).date_naive() == day)
            .count();
        Self {
            total: tasks.len(),
            completed,
            pending: tasks.len() - completed,
            due_today,
        }
    }
}

/// A projected view ready for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct View {
    pub options: ViewOptions,
    pub tasks: Vec<Task>,
    /// Empty inventory cells after the tasks (grid layout only).
    pub empty_slots: usize,
    pub progress: Progress,
}

/// Project `tasks` through `options`. Progress always covers the whole
/// collection, not just the filtered rows.
pub fn project(tasks: &[Task], options: ViewOptions) -> View {
    let derived = derive_tasks(tasks, options.filter, options.sort);
    let empty_slots = match options.display {
        DisplayMode::List => 0,
        DisplayMode::Grid => INVENTORY_SLOTS.saturating_sub(derived.len()),
    };
    View {
        options,
        tasks: derived,
        empty_slots,
        progress: Progress::from_tasks(tasks),
    }
}
