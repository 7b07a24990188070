//! Task records and the shapes used to create and update them.
//!
//! A [`Task`] serializes to the record shape shared by both backends:
//!
//! ```text
//! { id, user_id, title, description, due_date, category, is_complete, created_at }
//! ```
//!
//! `due_date` and `created_at` are ISO-8601 instants.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Time of day used when a draft names a due date without a time.
pub const DEFAULT_DUE_TIME: (u32, u32) = (23, 59);

/// Closed set of task categories.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Category {
    #[default]
    Homework,
    Exam,
    Project,
    Personal,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Homework,
        Category::Exam,
        Category::Project,
        Category::Personal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Homework => "Homework",
            Category::Exam => "Exam",
            Category::Project => "Project",
            Category::Personal => "Personal",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        Category::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| {
                Error::Validation(format!(
                    "unknown category '{trimmed}' (expected one of: homework, exam, project, personal)"
                ))
            })
    }
}

/// A unit of work owned by one identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    #[serde(rename = "user_id")]
    pub owner: String,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(rename = "due_date")]
    pub due: DateTime<Utc>,
    pub category: Category,
    #[serde(rename = "is_complete")]
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

/// Nullable text columns arrive as `null`; treat them as empty.
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Task {
    /// Apply a partial update in place. `id`, `owner` and `created_at` never change.
    pub fn apply(&mut self, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(due) = patch.due {
            self.due = due;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
    }
}

/// User-supplied fields for a new task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub due: DateTime<Utc>,
    pub category: Category,
}

impl TaskDraft {
    /// Draft due at the end of the current local day, in the default category.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            due: due_on(Local::now().date_naive(), None),
            category: Category::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_due(mut self, due: DateTime<Utc>) -> Self {
        self.due = due;
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_title(&self.title)
    }

    /// The full field set, as sent by an edit.
    pub fn to_patch(&self) -> TaskPatch {
        TaskPatch {
            title: Some(self.title.clone()),
            description: Some(self.description.clone()),
            due: Some(self.due),
            category: Some(self.category),
            completed: None,
        }
    }
}

/// Record handed to a backend's `create`: a draft bound to its owner.
///
/// The backend assigns `id` and `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewTask {
    #[serde(rename = "user_id")]
    pub owner: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "due_date")]
    pub due: DateTime<Utc>,
    pub category: Category,
    #[serde(rename = "is_complete")]
    pub completed: bool,
}

impl NewTask {
    pub fn from_draft(owner: impl Into<String>, draft: &TaskDraft) -> Self {
        Self {
            owner: owner.into(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            due: draft.due,
            category: draft.category,
            completed: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.owner.trim().is_empty() {
            return Err(Error::Validation("owner is required".to_string()));
        }
        validate_title(&self.title)
    }

    pub fn into_task(self, id: String, created_at: DateTime<Utc>) -> Task {
        Task {
            id,
            owner: self.owner,
            title: self.title,
            description: self.description,
            due: self.due,
            category: self.category,
            completed: self.completed,
            created_at,
        }
    }
}

/// Partial update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "due_date", skip_serializing_if = "Option::is_none")]
    pub due: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(rename = "is_complete", skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl TaskPatch {
    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.due.is_none()
            && self.category.is_none()
            && self.completed.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::Validation("update has no fields".to_string()));
        }
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        Ok(())
    }
}

fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(Error::Validation("title is required".to_string()));
    }
    Ok(())
}

/// Local date plus optional time of day, as an absolute instant.
///
/// A missing time means end of day (23:59). Ambiguous local times resolve
/// to the earlier instant; times skipped by a DST jump fall back to UTC.
pub fn due_on(date: NaiveDate, time: Option<NaiveTime>) -> DateTime<Utc> {
    let time = time.unwrap_or_else(|| {
        NaiveTime::from_hms_opt(DEFAULT_DUE_TIME.0, DEFAULT_DUE_TIME.1, 0)
            .unwrap_or(NaiveTime::MIN)
    });
    let naive = date.and_time(time);
    match Local.from_local_datetime(&naive).earliest() {
        Some(local) => local.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&naive),
    }
}

/// Parse a due timestamp from user input.
///
/// Accepts RFC 3339 (`2025-03-01T09:00:00Z`), a local `YYYY-MM-DD HH:MM`
/// (or `T` separated), or a bare `YYYY-MM-DD` meaning 23:59 local.
pub fn parse_due(raw: &str) -> Result<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(due_on(naive.date(), Some(naive.time())));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(due_on(date, None));
    }
    Err(Error::InvalidArgument(format!(
        "invalid due date '{trimmed}' (expected RFC 3339, YYYY-MM-DD HH:MM or YYYY-MM-DD)"
    )))
}
