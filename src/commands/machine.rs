//! Machine commands
//!
//! `machine add` connects to a new host, makes sure it runs a swarm with the
//! default overlay network, and records it in the registry.

use crate::Context;
use crate::cli::MachineCommand;
use crate::commands::annotate;
use crate::commands::network::{self, DEFAULT_NETWORK};
use crate::paths;
use crate::registry::{Machine, Registry};
use crate::runner::{LocalTransport, SshTransport};
use crate::ui::{self, DiffColors, PromptConfirm};
use anyhow::{Result, bail};
use chrono::Utc;
use reconcile::inspect::{self, NetworkListing};
use reconcile::{Flow, Pipeline, ShellCommand, Transport, confirm_changes, skip_reset};
use std::io::{self, Write};

pub fn run(ctx: &Context, cmd: MachineCommand) -> Result<()> {
    match cmd {
        MachineCommand::Add {
            name,
            address,
            user,
            key,
            port,
            force,
        } => add(
            ctx,
            Machine {
                name,
                address,
                user,
                key_path: paths::expand(&key),
                port,
                added_at: Some(Utc::now()),
            },
            force,
        ),
        MachineCommand::List { json } => list(ctx, json),
        MachineCommand::Use { name } => use_machine(ctx, &name),
        MachineCommand::Delete { name } => delete(ctx, &name),
    }
}

/// What a machine needs before it can take deployments.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MachineReport {
    pub swarm_active: bool,
    pub has_default_network: bool,
}

impl MachineReport {
    pub fn is_ready(&self) -> bool {
        self.swarm_active && self.has_default_network
    }
}

pub fn swarm_init_command(address: &str) -> ShellCommand {
    ShellCommand::new("docker swarm init").flag("advertise-addr", address)
}

/// Read swarm membership and look for the default network.
///
/// A node outside a swarm cannot hold overlay networks, so the lookup is
/// skipped for it.
pub fn inspect_machine(transport: &mut dyn Transport) -> reconcile::Result<MachineReport> {
    let mut swarm_active = false;
    let mut has_default_network = false;

    Pipeline::new(transport)
        .run(inspect::info_command(), |output| {
            swarm_active = inspect::swarm_active(output)?;
            Ok(if swarm_active {
                Flow::Continue
            } else {
                Flow::Stop
            })
        })
        .run(inspect::network_list_command(DEFAULT_NETWORK), |output| {
            has_default_network =
                inspect::parse_json_lines::<NetworkListing>("network listing", output)?
                    .iter()
                    .any(|network| network.name == DEFAULT_NETWORK);
            Ok(Flow::Continue)
        })
        .on_error(skip_reset)
        .finish()?;

    Ok(MachineReport {
        swarm_active,
        has_default_network,
    })
}

/// Commands that bring a machine from `report` to ready.
pub fn setup_commands(address: &str, report: &MachineReport) -> Vec<ShellCommand> {
    let mut commands = Vec::new();
    if !report.swarm_active {
        commands.push(swarm_init_command(address));
    }
    if !report.has_default_network {
        commands.push(network::create_command(DEFAULT_NETWORK));
    }
    commands
}

/// Run the setup commands, stopping at the first failure.
pub fn prepare_machine(
    transport: &mut dyn Transport,
    commands: &[ShellCommand],
) -> reconcile::Result<()> {
    commands
        .iter()
        .fold(Pipeline::new(transport), |pipeline, command| {
            pipeline.run(command, |_| Ok(Flow::Continue))
        })
        .finish()?;
    Ok(())
}

fn write_setup_plan<W: Write + ?Sized>(
    out: &mut W,
    machine: &Machine,
    report: &MachineReport,
) -> io::Result<()> {
    writeln!(
        out,
        "\nSkiff will set up machine {} ({}):\n",
        machine.name,
        machine.destination()
    )?;
    if report.swarm_active {
        writeln!(out, "   swarm (already active)")?;
    } else {
        writeln!(out, " + swarm init --advertise-addr {}", machine.address)?;
    }
    if report.has_default_network {
        writeln!(out, "   network {DEFAULT_NETWORK} (already exists)")?;
    } else {
        writeln!(out, " + network {DEFAULT_NETWORK}")?;
    }
    writeln!(out)
}

fn add(ctx: &Context, machine: Machine, force: bool) -> Result<()> {
    let mut registry = Registry::load(&ctx.registry_path)?;
    if registry.get(&machine.name).is_some() {
        bail!("Machine '{}' is already configured", machine.name);
    }
    if !ctx.local && !machine.key_path.exists() {
        bail!("SSH key not found: {}", machine.key_path.display());
    }

    let mut transport: Box<dyn Transport> = if ctx.local {
        Box::new(LocalTransport)
    } else {
        Box::new(SshTransport::for_machine(&machine))
    };

    if !ctx.quiet {
        ui::info(&format!("Connecting to {}", machine.destination()));
    }
    let report = annotate(
        inspect_machine(transport.as_mut()),
        "Could not inspect machine",
    )?;
    log::debug!("{}: {report:?}", machine.name);

    if report.is_ready() {
        ui::info(&format!("{} is ready for deployments", machine.name));
    } else {
        let mut out = DiffColors::new(io::stdout());
        write_setup_plan(&mut out, &machine, &report)?;
        annotate(
            confirm_changes("set up this machine", force, &mut PromptConfirm, &mut out),
            "Could not set up machine",
        )?;
        out.flush()?;
        annotate(
            prepare_machine(
                transport.as_mut(),
                &setup_commands(&machine.address, &report),
            ),
            "Could not set up machine",
        )?;
    }

    let name = machine.name.clone();
    registry.add(machine)?;
    registry.set_default(&name)?;
    registry.save()?;

    ui::success(&format!("Added machine {name} (now the default)"));
    Ok(())
}

fn list(ctx: &Context, json: bool) -> Result<()> {
    let registry = Registry::load(&ctx.registry_path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&registry.machines)?);
        return Ok(());
    }
    if registry.machines.is_empty() {
        if !ctx.quiet {
            ui::info("No machines configured. Add one with `skiff machine add`");
        }
        return Ok(());
    }
    println!("{}", machines_table(&registry));
    Ok(())
}

fn machines_table(registry: &Registry) -> String {
    let rows: Vec<Vec<String>> = registry
        .machines
        .iter()
        .map(|machine| {
            let marker = if registry.default_machine.as_deref() == Some(machine.name.as_str()) {
                "*"
            } else {
                ""
            };
            vec![
                machine.name.clone(),
                machine.destination(),
                machine.port.to_string(),
                marker.to_string(),
            ]
        })
        .collect();
    ui::format_table(&["NAME", "DESTINATION", "PORT", "DEFAULT"], &rows)
}

fn use_machine(ctx: &Context, name: &str) -> Result<()> {
    let mut registry = Registry::load(&ctx.registry_path)?;
    registry.set_default(name)?;
    registry.save()?;
    ui::success(&format!("Using machine {name}"));
    Ok(())
}

fn delete(ctx: &Context, name: &str) -> Result<()> {
    let mut registry = Registry::load(&ctx.registry_path)?;
    let machine = registry.remove(name)?;
    registry.save()?;
    ui::success(&format!("Forgot machine {}", machine.name));
    if registry.default_machine.is_none() && !registry.machines.is_empty() {
        ui::warn("No default machine. Pick one with `skiff machine use`");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::MockTransport;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const SWARM_INFO: &str = r#"{"ID":"x","Swarm":{"NodeID":"node-1","LocalNodeState":"active"}}"#;
    const NO_SWARM_INFO: &str = r#"{"ID":"x","Swarm":{"NodeID":"","LocalNodeState":"inactive"}}"#;
    const DEFAULT_LISTING: &str =
        r#"{"ID":"n1","Name":"default","Driver":"overlay","Scope":"swarm"}"#;

    fn machine() -> Machine {
        Machine {
            name: "prod".into(),
            address: "10.0.0.5".into(),
            user: "deploy".into(),
            key_path: PathBuf::from("/keys/id"),
            port: 22,
            added_at: None,
        }
    }

    fn context(dir: &TempDir) -> Context {
        Context {
            verbose: 0,
            quiet: true,
            registry_path: dir.path().join("machines.toml"),
            machine: None,
            local: false,
        }
    }

    #[test]
    fn test_inspect_ready_machine() {
        let mut transport = MockTransport::new()
            .respond_to("docker info", SWARM_INFO)
            .respond_to("docker network ls", DEFAULT_LISTING);
        let report = inspect_machine(&mut transport).unwrap();
        assert!(report.is_ready());
        assert!(setup_commands("10.0.0.5", &report).is_empty());
    }

    #[test]
    fn test_inspect_skips_network_lookup_outside_swarm() {
        let mut transport = MockTransport::new().respond_to("docker info", NO_SWARM_INFO);
        let report = inspect_machine(&mut transport).unwrap();
        assert_eq!(report, MachineReport::default());
        assert_eq!(transport.commands(), ["docker info --format json"]);
    }

    #[test]
    fn test_inspect_surfaces_info_failure() {
        let mut transport = MockTransport::new().fail_on("docker info");
        assert!(inspect_machine(&mut transport).is_err());
        assert!(!transport.ran("docker network ls"));
    }

    #[test]
    fn test_prepare_fresh_machine() {
        let commands = setup_commands("10.0.0.5", &MachineReport::default());
        let mut transport = MockTransport::new();
        prepare_machine(&mut transport, &commands).unwrap();
        assert_eq!(
            transport.commands(),
            [
                "docker swarm init --advertise-addr 10.0.0.5",
                "docker network create --attachable --driver overlay --label skiff --scope swarm default",
            ]
        );
    }

    #[test]
    fn test_prepare_stops_at_first_failure() {
        let commands = setup_commands("10.0.0.5", &MachineReport::default());
        let mut transport = MockTransport::new().fail_on("docker swarm init");
        assert!(prepare_machine(&mut transport, &commands).is_err());
        assert!(!transport.ran("docker network create"));
    }

    #[test]
    fn test_setup_plan_output() {
        let report = MachineReport {
            swarm_active: true,
            has_default_network: false,
        };
        let mut out = Vec::new();
        write_setup_plan(&mut out, &machine(), &report).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\nSkiff will set up machine prod (deploy@10.0.0.5):\n\n   swarm (already active)\n + network default\n\n"
        );
    }

    #[test]
    fn test_use_and_delete() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let mut registry = Registry::load(&ctx.registry_path).unwrap();
        registry.add(machine()).unwrap();
        registry
            .add(Machine {
                name: "staging".into(),
                ..machine()
            })
            .unwrap();
        registry.save().unwrap();

        use_machine(&ctx, "staging").unwrap();
        let registry = Registry::load(&ctx.registry_path).unwrap();
        assert_eq!(registry.default_machine.as_deref(), Some("staging"));
        assert!(machines_table(&registry).contains("staging  deploy@10.0.0.5  22    *"));

        delete(&ctx, "staging").unwrap();
        let registry = Registry::load(&ctx.registry_path).unwrap();
        assert_eq!(registry.default_machine, None);
        assert_eq!(registry.machines.len(), 1);

        assert!(use_machine(&ctx, "missing").is_err());
    }

    #[test]
    fn test_add_rejects_missing_key() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let machine = Machine {
            key_path: dir.path().join("nope"),
            ..machine()
        };
        let err = add(&ctx, machine, true).unwrap_err();
        assert!(err.to_string().starts_with("SSH key not found"));
        assert!(!ctx.registry_path.exists());
    }
}
