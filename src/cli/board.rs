//! questlog list/stats

use chrono::Local;
use serde::Serialize;

use crate::cli::App;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::task::Task;
use crate::view::{DashboardStats, DisplayMode, FilterMode, Progress, SortMode, ViewOptions};

const GRID_COLUMNS: usize = 9;

#[derive(Serialize)]
struct StatsReport {
    progress: Progress,
    dashboard: DashboardStats,
}

pub fn run_list(
    app: &App,
    filter: FilterMode,
    sort: SortMode,
    display: DisplayMode,
    output: OutputOptions,
) -> Result<()> {
    app.require_session()?;
    let view = app.store.view(ViewOptions {
        filter,
        sort,
        display,
    });

    let mut human = HumanOutput::new(format!(
        "Quests ({filter}, {sort}): {} shown",
        view.tasks.len()
    ));
    human.push_summary(
        "level",
        format!("{} ({:.0}%)", view.progress.level, view.progress.progress),
    );
    match display {
        DisplayMode::List => {
            for task in &view.tasks {
                human.push_detail(list_row(task));
            }
        }
        DisplayMode::Grid => {
            let cells: Vec<&str> = view
                .tasks
                .iter()
                .map(|task| if task.completed { "[x]" } else { "[ ]" })
                .chain(std::iter::repeat("[.]").take(view.empty_slots))
                .collect();
            for row in cells.chunks(GRID_COLUMNS) {
                human.push_detail(row.join(""));
            }
        }
    }
    if view.tasks.is_empty() && filter == FilterMode::All {
        human.push_next_step("questlog add \"<title>\"");
    }

    emit_success(output, "list", &view, Some(&human))
}

pub fn run_stats(app: &App, output: OutputOptions) -> Result<()> {
    app.require_session()?;
    let report = StatsReport {
        progress: app.store.progress(),
        dashboard: app.store.stats(),
    };

    let mut human = HumanOutput::new(format!("Level {}", report.progress.level));
    human.push_summary("progress", format!("{:.0}%", report.progress.progress));
    human.push_summary("total", report.dashboard.total.to_string());
    human.push_summary("completed", report.dashboard.completed.to_string());
    human.push_summary("pending", report.dashboard.pending.to_string());
    human.push_summary("due today", report.dashboard.due_today.to_string());

    emit_success(output, "stats", &report, Some(&human))
}

fn list_row(task: &Task) -> String {
    let mark = if task.completed { "x" } else { " " };
    format!(
        "[{mark}] {}  {}  {:<8}  {}",
        task.id,
        task.due.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
        task.category,
        task.title
    )
}
