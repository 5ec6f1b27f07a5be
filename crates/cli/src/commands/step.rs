use std::collections::BTreeMap;
use std::path::PathBuf;

use choreo_runtime::{Activity, ActivityStatus, Decision, RunState, Step, MAIN_BRANCH};
use choreo_storage::FsJournalStore;
use serde::Serialize;

use super::{scan_one, Context};
use crate::error::CliError;
use crate::OutputFormat;

/// How `cmd_advance` settles the pending step before pulling the next one.
pub(crate) enum Control {
    Next,
    Decide(String),
    Fail(String),
    Follow(String),
}

#[derive(Serialize)]
struct StepReport<'a> {
    journal: &'a str,
    step: Option<&'a Step>,
    status: ActivityStatus,
}

pub(crate) async fn cmd_start(
    ctx: &Context,
    manifest: PathBuf,
    tags: BTreeMap<String, String>,
) -> Result<(), CliError> {
    let unit = scan_one(manifest)?;
    let cache = ctx.cache();
    cache.rebuild(&unit).await?;

    let mut activity = Activity::open(&cache, ctx.journals(), unit.name(), &tags).await?;
    let step = activity.next_step().await?;
    print_step(ctx, &activity, step.as_ref());
    Ok(())
}

pub(crate) async fn cmd_advance(
    ctx: &Context,
    journal: &str,
    control: Control,
) -> Result<(), CliError> {
    let mut activity = reopen(ctx, journal).await?;
    match control {
        Control::Next => {}
        Control::Decide(value) => activity.decide(Decision::parse_token(&value))?,
        Control::Fail(message) => activity.fail(&message)?,
        Control::Follow(branch) => activity.follow_branch(&branch)?,
    }
    let step = activity.next_step().await?;
    print_step(ctx, &activity, step.as_ref());
    Ok(())
}

pub(crate) async fn cmd_hold(ctx: &Context, journal: &str, pause: bool) -> Result<(), CliError> {
    let mut activity = reopen(ctx, journal).await?;
    if pause {
        activity.pause();
    } else {
        activity.resume();
    }
    activity.checkpoint().await?;
    print_status(ctx, &activity.status());
    Ok(())
}

pub(crate) async fn cmd_status(ctx: &Context, journal: &str) -> Result<(), CliError> {
    let activity = reopen(ctx, journal).await?;
    print_status(ctx, &activity.status());
    Ok(())
}

async fn reopen(ctx: &Context, journal: &str) -> Result<Activity<FsJournalStore>, CliError> {
    Ok(Activity::reopen(&ctx.cache(), ctx.journals(), journal).await?)
}

fn print_step(ctx: &Context, activity: &Activity<FsJournalStore>, step: Option<&Step>) {
    let status = activity.status();
    match ctx.output {
        OutputFormat::Json => ctx.print_json(&StepReport {
            journal: activity.id(),
            step,
            status,
        }),
        OutputFormat::Text => match step {
            Some(step) => println!("{} run {}", activity.id(), describe_step(step)),
            None => println!("{} {}", activity.id(), describe_state(&status)),
        },
    }
}

fn describe_step(step: &Step) -> String {
    let mut out = step.action.clone();
    if step.branch != MAIN_BRANCH {
        out.push_str(&format!(" (branch {})", step.branch));
    }
    if step.detach {
        out.push_str(" [detach]");
    }
    out
}

fn describe_state(status: &ActivityStatus) -> String {
    match status.state {
        RunState::Split => format!("split: choose {}", status.split.join(" | ")),
        RunState::Failed => format!(
            "failed: {}",
            status.error.as_deref().unwrap_or("unknown error")
        ),
        other => other.to_string(),
    }
}

fn print_status(ctx: &Context, status: &ActivityStatus) {
    match ctx.output {
        OutputFormat::Json => ctx.print_json(status),
        OutputFormat::Text => print!("{}", render_status(status)),
    }
}

fn render_status(status: &ActivityStatus) -> String {
    let mut out = String::new();
    out.push_str(&format!("journal  {}\n", status.journal));
    out.push_str(&format!("unit     {}\n", status.unit));
    out.push_str(&format!("state    {}\n", describe_state(status)));
    out.push_str(&format!("current  {}\n", status.current));
    if let Some(p) = &status.pending {
        out.push_str(&format!("pending  {} (branch {})\n", p.action, p.branch));
    }
    for b in &status.branches {
        let flag = if b.running { "" } else { " (paused)" };
        out.push_str(&format!("branch   {} {}{}\n", b.id, b.action, flag));
    }
    for b in &status.retired {
        match &b.error {
            Some(e) => out.push_str(&format!("retired  {} {}: {}\n", b.id, b.action, e)),
            None => out.push_str(&format!("retired  {} {}\n", b.id, b.action)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_descriptions() {
        let step = Step {
            branch: 2,
            action: "Ship::label".into(),
            detach: true,
        };
        assert_eq!(describe_step(&step), "Ship::label (branch 2) [detach]");
        let step = Step {
            branch: MAIN_BRANCH,
            action: "go".into(),
            detach: false,
        };
        assert_eq!(describe_step(&step), "go");
    }
}
