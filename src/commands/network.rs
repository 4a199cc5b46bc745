//! Network commands
//!
//! Services attach to swarm-scoped overlay networks labelled `skiff`.

use crate::Context;
use crate::cli::NetworkCommand;
use crate::commands::annotate;
use crate::runner;
use crate::ui::{self, PromptConfirm};
use anyhow::{Result, bail};
use reconcile::inspect::{self, NetworkListing};
use reconcile::{Flow, LABEL, Pipeline, ShellCommand, Transport, confirm_changes};
use std::io;

/// Network created on every machine during `machine add`.
pub const DEFAULT_NETWORK: &str = "default";

pub fn run(ctx: &Context, cmd: NetworkCommand) -> Result<()> {
    match cmd {
        NetworkCommand::Add { name, force } => add(ctx, &name, force),
        NetworkCommand::Delete { name, force } => delete(ctx, &name, force),
        NetworkCommand::List { json } => list(ctx, json),
    }
}

pub fn create_command(name: &str) -> ShellCommand {
    ShellCommand::new("docker network create")
        .switch("attachable")
        .flag("driver", "overlay")
        .flag("label", LABEL)
        .flag("scope", "swarm")
        .arg(name)
}

pub fn remove_command(name: &str) -> ShellCommand {
    ShellCommand::new("docker network rm").arg(name)
}

/// Managed networks whose name starts with `name` (all when empty).
pub fn list_networks(
    transport: &mut dyn Transport,
    name: &str,
) -> reconcile::Result<Vec<NetworkListing>> {
    let mut networks = Vec::new();
    Pipeline::new(transport)
        .run(inspect::network_list_command(name), |output| {
            networks = inspect::parse_json_lines("network listing", output)?;
            Ok(Flow::Continue)
        })
        .finish()?;
    Ok(networks)
}

/// The managed network called exactly `name`.
pub fn find_network(
    transport: &mut dyn Transport,
    name: &str,
) -> reconcile::Result<Option<NetworkListing>> {
    Ok(list_networks(transport, name)?
        .into_iter()
        .find(|network| network.name == name))
}

fn add(ctx: &Context, name: &str, force: bool) -> Result<()> {
    let mut transport = runner::connect(ctx)?;
    if annotate(find_network(transport.as_mut(), name), "Could not list networks")?.is_some() {
        ui::info(&format!("Network {name} already exists"));
        return Ok(());
    }

    println!("\nSkiff will create network {name}:\n");
    println!(" + network {name}\n");
    let mut out = io::stdout();
    annotate(
        confirm_changes("create this network", force, &mut PromptConfirm, &mut out),
        "Could not create network",
    )?;

    annotate(
        Pipeline::new(transport.as_mut())
            .run(create_command(name), |_| Ok(Flow::Continue))
            .finish(),
        "Could not create network",
    )?;
    ui::success(&format!("Skiff created network {name}."));
    Ok(())
}

fn delete(ctx: &Context, name: &str, force: bool) -> Result<()> {
    let mut transport = runner::connect(ctx)?;
    if annotate(find_network(transport.as_mut(), name), "Could not list networks")?.is_none() {
        bail!("No network named '{name}'");
    }

    println!("\nSkiff will delete network {name}:\n");
    println!(" - network {name}\n");
    let mut out = io::stdout();
    annotate(
        confirm_changes("delete this network", force, &mut PromptConfirm, &mut out),
        "Could not delete network",
    )?;

    annotate(
        Pipeline::new(transport.as_mut())
            .run(remove_command(name), |_| Ok(Flow::Continue))
            .finish(),
        "Could not delete network",
    )?;
    ui::success(&format!("Skiff deleted network {name}."));
    Ok(())
}

fn list(ctx: &Context, json: bool) -> Result<()> {
    let mut transport = runner::connect(ctx)?;
    let mut networks = annotate(list_networks(transport.as_mut(), ""), "Could not list networks")?;
    networks.sort_by(|a, b| a.name.cmp(&b.name));

    if json {
        println!("{}", serde_json::to_string_pretty(&networks)?);
        return Ok(());
    }
    if networks.is_empty() {
        if !ctx.quiet {
            ui::info("No networks created");
        }
        return Ok(());
    }
    println!("{}", networks_table(&networks));
    Ok(())
}

fn networks_table(networks: &[NetworkListing]) -> String {
    let rows: Vec<Vec<String>> = networks
        .iter()
        .map(|network| {
            vec![
                network.name.clone(),
                network.driver.clone(),
                network.scope.clone(),
                network.id.clone(),
            ]
        })
        .collect();
    ui::format_table(&["NAME", "DRIVER", "SCOPE", "ID"], &rows)
}
