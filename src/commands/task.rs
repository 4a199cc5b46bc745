//! One-off tasks
//!
//! A task is an unnamed service labelled `skiff=task` whose containers are
//! not restarted once the command exits. Listing and logs work on the
//! containers, which carry the same label.

use crate::Context;
use crate::cli::{TaskCommand, TaskLogsArgs, TaskRunArgs};
use crate::commands::{annotate, logs};
use crate::runner;
use crate::ui::{self, DiffColors, PromptConfirm};
use anyhow::Result;
use reconcile::executor::pull_command;
use reconcile::inspect;
use reconcile::{
    ConfirmCallback, DiffStatus, Flow, Pipeline, ServiceState, ShellCommand, TASK_LABEL,
    Transport, confirm_changes, plan_task,
};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// One line of `docker container ls --format json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct TaskListing {
    #[serde(rename = "ID")]
    pub id: String,
    pub image: String,
    pub command: String,
    pub created_at: String,
    pub running_for: String,
    pub state: String,
    pub status: String,
    pub names: String,
}

pub fn run(ctx: &Context, cmd: TaskCommand) -> Result<()> {
    match cmd {
        TaskCommand::Run(args) => start(ctx, &args),
        TaskCommand::List { last, json } => list(ctx, last, json),
        TaskCommand::Logs(args) => show_logs(ctx, &args),
    }
}

/// The state a task is created from.
pub fn task_state(args: &TaskRunArgs) -> ServiceState {
    ServiceState {
        command: args.command.clone(),
        image: args.image.clone(),
        networks: if args.network.is_empty() {
            Vec::new()
        } else {
            vec![args.network.clone()]
        },
        publish: args.publish.clone(),
        replicas: args.replicas.to_string(),
        ..Default::default()
    }
}

/// Show the task, confirm, pull its image and create it.
///
/// Returns the ID of the created service.
pub fn run_task<C, W>(
    transport: &mut dyn Transport,
    desired: &ServiceState,
    force: bool,
    confirm: &mut C,
    out: &mut W,
) -> reconcile::Result<String>
where
    C: ConfirmCallback + ?Sized,
    W: Write + ?Sized,
{
    let diff = reconcile::diff(desired, &ServiceState::default());
    writeln!(out, "\nSkiff will run a task:\n")?;
    writeln!(out, " {} task:", DiffStatus::Create.symbol())?;
    writeln!(out, "{}\n", diff.render())?;
    confirm_changes("run this task", force, confirm, out)?;

    writeln!(out, "Deploying...")?;
    let mut id = String::new();
    Pipeline::new(transport)
        .run(pull_command(&desired.image), |_| Ok(Flow::Continue))
        .run(plan_task(desired).command, |output| {
            id = output.trim().to_string();
            Ok(Flow::Continue)
        })
        .finish()?;
    writeln!(out, "Skiff started task {id}.")?;
    Ok(id)
}

pub fn list_command(last: Option<u64>) -> ShellCommand {
    ShellCommand::new("docker container ls")
        .flag("format", "json")
        .flag("filter", format!("label={TASK_LABEL}"))
        .flag_if(
            last.is_some(),
            "last",
            last.map(|n| n.to_string()).unwrap_or_default(),
        )
}

pub fn list_tasks(
    transport: &mut dyn Transport,
    last: Option<u64>,
) -> reconcile::Result<Vec<TaskListing>> {
    let mut tasks = Vec::new();
    Pipeline::new(transport)
        .run(list_command(last), |output| {
            tasks = inspect::parse_json_lines("task listing", output)?;
            Ok(Flow::Continue)
        })
        .finish()?;
    Ok(tasks)
}

fn start(ctx: &Context, args: &TaskRunArgs) -> Result<()> {
    let mut transport = runner::connect(ctx)?;
    let mut out = DiffColors::new(io::stdout());
    annotate(
        run_task(
            transport.as_mut(),
            &task_state(args),
            args.force,
            &mut PromptConfirm,
            &mut out,
        ),
        "Could not run task",
    )?;
    out.flush()?;
    Ok(())
}

fn list(ctx: &Context, last: Option<u64>, json: bool) -> Result<()> {
    let mut transport = runner::connect(ctx)?;
    let tasks = annotate(list_tasks(transport.as_mut(), last), "Could not list tasks")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(());
    }
    if tasks.is_empty() {
        if !ctx.quiet {
            ui::info("No tasks running");
        }
        return Ok(());
    }
    println!("{}", tasks_table(&tasks));
    Ok(())
}

fn tasks_table(tasks: &[TaskListing]) -> String {
    let rows: Vec<Vec<String>> = tasks
        .iter()
        .map(|task| {
            vec![
                task.id.clone(),
                task.image.clone(),
                task.command.clone(),
                task.running_for.clone(),
                task.status.clone(),
            ]
        })
        .collect();
    ui::format_table(&["ID", "IMAGE", "COMMAND", "CREATED", "STATUS"], &rows)
}

fn show_logs(ctx: &Context, args: &TaskLogsArgs) -> Result<()> {
    let command = logs::container_logs_command(&args.id, &args.options)?;
    logs::print_logs(ctx, &command)
}
