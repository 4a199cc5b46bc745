//! Secret commands

use crate::Context;
use crate::cli::SecretCommand;
use crate::commands::annotate;
use crate::runner;
use crate::ui::{self, PromptConfirm};
use anyhow::Result;
use reconcile::inspect;
use reconcile::{Flow, LABEL, Pipeline, ShellCommand, Transport, confirm_changes};
use serde::{Deserialize, Serialize};
use std::io;

/// One line of `docker secret ls --format json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct SecretListing {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}

pub fn run(ctx: &Context, cmd: SecretCommand) -> Result<()> {
    match cmd {
        SecretCommand::Delete { name, force } => delete(ctx, &name, force),
        SecretCommand::List { json } => list(ctx, json),
    }
}

pub fn list_command() -> ShellCommand {
    ShellCommand::new("docker secret ls")
        .flag("format", "json")
        .flag("filter", format!("label={LABEL}"))
}

pub fn remove_command(name: &str) -> ShellCommand {
    ShellCommand::new("docker secret rm").arg(name)
}

pub fn list_secrets(transport: &mut dyn Transport) -> reconcile::Result<Vec<SecretListing>> {
    let mut secrets = Vec::new();
    Pipeline::new(transport)
        .run(list_command(), |output| {
            secrets = inspect::parse_json_lines("secret listing", output)?;
            Ok(Flow::Continue)
        })
        .finish()?;
    secrets.sort_by(|a: &SecretListing, b| a.name.cmp(&b.name));
    Ok(secrets)
}

fn delete(ctx: &Context, name: &str, force: bool) -> Result<()> {
    let mut transport = runner::connect(ctx)?;

    println!("\nSkiff will delete secret {name}:\n");
    println!(" - secret {name}\n");
    annotate(
        confirm_changes("delete this secret", force, &mut PromptConfirm, &mut io::stdout()),
        "Could not delete secret",
    )?;

    annotate(
        Pipeline::new(transport.as_mut())
            .run(remove_command(name), |_| Ok(Flow::Continue))
            .finish(),
        "Could not delete secret",
    )?;
    ui::success(&format!("Skiff deleted secret {name}."));
    Ok(())
}

fn list(ctx: &Context, json: bool) -> Result<()> {
    let mut transport = runner::connect(ctx)?;
    let secrets = annotate(list_secrets(transport.as_mut()), "Could not list secrets")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&secrets)?);
        return Ok(());
    }
    if secrets.is_empty() {
        if !ctx.quiet {
            ui::info("No secrets created");
        }
        return Ok(());
    }
    println!("{}", secrets_table(&secrets));
    Ok(())
}

fn secrets_table(secrets: &[SecretListing]) -> String {
    let rows: Vec<Vec<String>> = secrets
        .iter()
        .map(|secret| {
            vec![
                secret.name.clone(),
                secret.id.clone(),
                secret.created_at.clone(),
                secret.updated_at.clone(),
            ]
        })
        .collect();
    ui::format_table(&["NAME", "ID", "CREATED", "UPDATED"], &rows)
}
