//! Service commands

use crate::Context;
use crate::cli::{InspectArgs, ServiceCommand, ServiceRunArgs};
use crate::commands::annotate;
use crate::runner;
use crate::ui::{self, DiffColors, PromptConfirm};
use anyhow::Result;
use reconcile::{DeployRequest, ServiceSummary, inspect};
use std::io::{self, Write};

pub fn run(ctx: &Context, cmd: ServiceCommand) -> Result<()> {
    match cmd {
        ServiceCommand::Run(args) => deploy(ctx, &args),
        ServiceCommand::Redeploy { name, force } => redeploy(ctx, &name, force),
        ServiceCommand::Delete { name, force } => delete(ctx, &name, force),
        ServiceCommand::List { json } => list(ctx, json),
    }
}

fn deploy(ctx: &Context, args: &ServiceRunArgs) -> Result<()> {
    let mut transport = runner::connect(ctx)?;
    let request = DeployRequest {
        spec: args.to_spec(),
        force: args.force,
    };

    let mut out = DiffColors::new(io::stdout());
    let deployment = annotate(
        reconcile::deploy(transport.as_mut(), &request, &mut PromptConfirm, &mut out),
        "Could not deploy service",
    )?;
    out.flush()?;

    if ctx.verbose > 0 {
        ui::dim(&format!("ran: {}", deployment.command));
    }
    Ok(())
}

fn redeploy(ctx: &Context, name: &str, force: bool) -> Result<()> {
    let mut transport = runner::connect(ctx)?;
    let mut out = DiffColors::new(io::stdout());
    annotate(
        reconcile::redeploy(transport.as_mut(), name, force, &mut PromptConfirm, &mut out),
        "Could not redeploy service",
    )?;
    out.flush()?;
    Ok(())
}

fn delete(ctx: &Context, name: &str, force: bool) -> Result<()> {
    let mut transport = runner::connect(ctx)?;
    let mut out = DiffColors::new(io::stdout());
    annotate(
        reconcile::remove(transport.as_mut(), name, force, &mut PromptConfirm, &mut out),
        "Could not delete service",
    )?;
    out.flush()?;
    Ok(())
}

fn list(ctx: &Context, json: bool) -> Result<()> {
    let mut transport = runner::connect(ctx)?;
    let services = annotate(
        reconcile::list_services(transport.as_mut()),
        "Could not list services",
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&services)?);
        return Ok(());
    }
    if services.is_empty() {
        if !ctx.quiet {
            ui::info("No services deployed");
        }
        return Ok(());
    }
    println!("{}", services_table(&services));
    Ok(())
}

fn services_table(services: &[ServiceSummary]) -> String {
    let rows: Vec<Vec<String>> = services
        .iter()
        .map(|service| {
            vec![
                service.name.clone(),
                service.image.clone(),
                service.replicas.clone(),
                service.ports.join(", "),
            ]
        })
        .collect();
    ui::format_table(&["NAME", "IMAGE", "REPLICAS", "PORTS"], &rows)
}

/// `skiff inspect`
pub fn show(ctx: &Context, args: &InspectArgs) -> Result<()> {
    let mut transport = runner::connect(ctx)?;

    if args.json {
        let raw = annotate(
            inspect::read_raw(transport.as_mut(), &args.name),
            "Could not inspect service",
        )?;
        println!("{}", serde_json::to_string_pretty(&raw)?);
        return Ok(());
    }

    let mut out = DiffColors::new(io::stdout());
    annotate(
        reconcile::describe(transport.as_mut(), &args.name, &mut out),
        "Could not inspect service",
    )?;
    out.flush()?;
    Ok(())
}
