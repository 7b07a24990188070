//! questlog login/logout/whoami

use serde::Serialize;

use crate::cli::App;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::session::SessionProvider;

#[derive(Serialize)]
struct SessionReport {
    signed_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    tasks: usize,
}

pub async fn run_login(app: &App, email: &str, output: OutputOptions) -> Result<()> {
    let session = app.sessions.sign_in(email).await?;
    app.store.set_session(Some(session.clone())).await?;

    let progress = app.store.progress();
    let report = SessionReport {
        signed_in: true,
        id: Some(session.id.clone()),
        email: Some(session.email.clone()),
        tasks: app.store.tasks().len(),
    };

    let mut human = HumanOutput::new(format!("Welcome back, {}!", session.handle()));
    human.push_summary("email", session.email.clone());
    human.push_summary("level", progress.level.to_string());
    human.push_summary("tasks", report.tasks.to_string());
    if report.tasks == 0 {
        human.push_next_step("questlog add \"<title>\"");
    }

    emit_success(output, "login", &report, Some(&human))
}

pub async fn run_logout(app: &App, output: OutputOptions) -> Result<()> {
    let previous = app.sessions.current();
    app.sessions.sign_out().await?;
    app.store.set_session(None).await?;

    let report = SessionReport {
        signed_in: false,
        id: None,
        email: None,
        tasks: 0,
    };

    let header = match &previous {
        Some(session) => format!("Signed out {}", session.email),
        None => "Not signed in".to_string(),
    };
    let human = HumanOutput::new(header);

    emit_success(output, "logout", &report, Some(&human))
}

pub fn run_whoami(app: &App, output: OutputOptions) -> Result<()> {
    let session = app.sessions.current();
    let report = SessionReport {
        signed_in: session.is_some(),
        id: session.as_ref().map(|s| s.id.clone()),
        email: session.as_ref().map(|s| s.email.clone()),
        tasks: app.store.tasks().len(),
    };

    let mut human = match &session {
        Some(session) => {
            let mut human = HumanOutput::new(session.email.clone());
            human.push_summary("id", session.id.clone());
            human.push_summary("tasks", report.tasks.to_string());
            human
        }
        None => {
            let mut human = HumanOutput::new("Not signed in");
            human.push_next_step("questlog login <email>");
            human
        }
    };
    human.push_detail(format!("data: {}", app.data_dir.display()));

    emit_success(output, "whoami", &report, Some(&human))
}
