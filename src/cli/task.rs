//! questlog add/edit/toggle/rm

use serde::Serialize;

use crate::cli::App;
use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::reward::RewardSignal;
use crate::store::MutationReport;
use crate::task::{parse_due, Category, Task, TaskDraft};

pub struct AddOptions {
    pub title: String,
    pub description: String,
    pub due: Option<String>,
    pub category: Category,
}

pub struct EditOptions {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub due: Option<String>,
    pub category: Option<Category>,
}

#[derive(Serialize)]
struct MutationOutput<'a> {
    #[serde(flatten)]
    report: &'a MutationReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    task: Option<Task>,
    #[serde(skip_serializing_if = "Option::is_none")]
    signal: Option<RewardSignal>,
}

pub async fn run_add(app: &App, options: AddOptions, output: OutputOptions) -> Result<()> {
    app.require_session()?;

    let mut draft = TaskDraft::new(options.title)
        .with_description(options.description)
        .with_category(options.category);
    if let Some(raw) = options.due.as_deref() {
        draft = draft.with_due(parse_due(raw)?);
    }

    let task = app.store.add(draft).await?;

    let mut human = HumanOutput::new(format!("Added: {}", task.title));
    push_task_summary(&mut human, &task);
    emit_success(output, "add", &task, Some(&human))
}

pub async fn run_edit(app: &App, options: EditOptions, output: OutputOptions) -> Result<()> {
    app.require_session()?;
    let current = app
        .store
        .task(&options.id)
        .ok_or_else(|| Error::NotFound(options.id.clone()))?;

    let due = match options.due.as_deref() {
        Some(raw) => parse_due(raw)?,
        None => current.due,
    };
    let draft = TaskDraft {
        title: options.title.unwrap_or(current.title),
        description: options.description.unwrap_or(current.description),
        due,
        category: options.category.unwrap_or(current.category),
    };

    let task = app.store.edit(&options.id, draft).await?;

    let mut human = HumanOutput::new(format!("Updated: {}", task.title));
    push_task_summary(&mut human, &task);
    emit_success(output, "edit", &task, Some(&human))
}

pub async fn run_toggle(app: &App, id: &str, output: OutputOptions) -> Result<()> {
    app.require_session()?;
    let current = app
        .store
        .task(id)
        .ok_or_else(|| Error::NotFound(id.to_string()))?;
    let before = app.store.progress();

    let report = app.store.toggle(id, current.completed, None).await?;

    let signal = report.reward.and_then(|reward| {
        let event = app
            .store
            .active_rewards()
            .into_iter()
            .find(|event| event.id == reward)?;
        Some(RewardSignal::from(&event))
    });
    // No animation in a terminal: the drop lands as soon as it is shown.
    if let Some(reward) = report.reward {
        app.store.complete_reward(reward);
    }

    let after = app.store.progress();
    let task = app.store.task(id);
    let data = MutationOutput {
        report: &report,
        task: task.clone(),
        signal,
    };

    let header = match (&task, report.rollback_reason()) {
        (_, Some(_)) => format!("Could not update: {}", current.title),
        (Some(task), None) if task.completed => format!("Completed: {}", task.title),
        _ => format!("Reopened: {}", current.title),
    };
    let mut human = HumanOutput::new(header);
    human.push_summary(
        "level",
        format!("{} ({:.0}%)", after.level, after.progress),
    );
    if report.reward.is_some() && report.is_confirmed() {
        human.push_detail("+1 reward dropped");
    }
    if after.level > before.level {
        human.push_detail(format!("Level up! You are now level {}", after.level));
    }
    if let Some(reason) = report.rollback_reason() {
        human.push_warning(format!("rolled back: {reason}"));
    }

    emit_success(output, "toggle", &data, Some(&human))
}

pub async fn run_rm(app: &App, id: &str, output: OutputOptions) -> Result<()> {
    app.require_session()?;
    let current = app
        .store
        .task(id)
        .ok_or_else(|| Error::NotFound(id.to_string()))?;

    let report = app.store.remove(id).await?;
    let data = MutationOutput {
        report: &report,
        task: None,
        signal: None,
    };

    let mut human = match report.rollback_reason() {
        Some(reason) => {
            let mut human = HumanOutput::new(format!("Could not delete: {}", current.title));
            human.push_warning(format!("rolled back: {reason}"));
            human
        }
        None => HumanOutput::new(format!("Deleted: {}", current.title)),
    };
    human.push_summary("remaining", app.store.tasks().len().to_string());

    emit_success(output, "rm", &data, Some(&human))
}

fn push_task_summary(human: &mut HumanOutput, task: &Task) {
    human.push_summary("id", task.id.clone());
    human.push_summary("category", task.category.to_string());
    human.push_summary(
        "due",
        task.due
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M")
            .to_string(),
    );
    if !task.description.is_empty() {
        human.push_summary("description", task.description.clone());
    }
}
