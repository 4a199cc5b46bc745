//! Volume commands

use crate::Context;
use crate::cli::{VolumeAddArgs, VolumeCommand};
use crate::commands::annotate;
use crate::runner;
use crate::ui::{self, PromptConfirm};
use anyhow::Result;
use reconcile::inspect;
use reconcile::{Error, Flow, LABEL, Pipeline, ShellCommand, Transport, confirm_changes};
use serde::{Deserialize, Serialize};
use std::io;

/// One line of `docker volume ls --format json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct VolumeListing {
    pub name: String,
    pub driver: String,
    pub availability: String,
    pub group: String,
    pub size: String,
    pub status: String,
}

pub fn run(ctx: &Context, cmd: VolumeCommand) -> Result<()> {
    match cmd {
        VolumeCommand::Add(args) => add(ctx, &args),
        VolumeCommand::Delete { name, force } => delete(ctx, &name, force),
        VolumeCommand::Inspect { name } => show(ctx, &name),
        VolumeCommand::List { json } => list(ctx, json),
    }
}

pub fn create_command(args: &VolumeAddArgs) -> ShellCommand {
    let optional = |value: &Option<String>| value.clone().unwrap_or_default();
    ShellCommand::new("docker volume create")
        .flag_if(args.availability.is_some(), "availability", optional(&args.availability))
        .flag_if(args.driver.is_some(), "driver", optional(&args.driver))
        .flag_if(args.group.is_some(), "group", optional(&args.group))
        .flag("label", LABEL)
        .flag_if(args.limit_bytes.is_some(), "limit-bytes", optional(&args.limit_bytes))
        .flag("name", &args.name)
        .flag_each("opt", &args.opts)
        .flag_if(
            args.required_bytes.is_some(),
            "required-bytes",
            optional(&args.required_bytes),
        )
        .flag_if(args.sharing.is_some(), "sharing", optional(&args.sharing))
        .flag_if(args.scope.is_some(), "scope", optional(&args.scope))
        .flag_if(args.access_type.is_some(), "type", optional(&args.access_type))
}

pub fn list_command() -> ShellCommand {
    ShellCommand::new("docker volume ls")
        .flag("format", "json")
        .flag("filter", format!("label={LABEL}"))
}

pub fn list_volumes(transport: &mut dyn Transport) -> reconcile::Result<Vec<VolumeListing>> {
    let mut volumes = Vec::new();
    Pipeline::new(transport)
        .run(list_command(), |output| {
            volumes = inspect::parse_json_lines("volume listing", output)?;
            Ok(Flow::Continue)
        })
        .finish()?;
    volumes.sort_by(|a: &VolumeListing, b| a.name.cmp(&b.name));
    Ok(volumes)
}

/// First element of `docker volume inspect NAME`.
pub fn inspect_volume(
    transport: &mut dyn Transport,
    name: &str,
) -> reconcile::Result<serde_json::Value> {
    let mut raw = serde_json::Value::Null;
    Pipeline::new(transport)
        .run(ShellCommand::new("docker volume inspect").arg(name), |output| {
            let items: Vec<serde_json::Value> = serde_json::from_str(output.trim())
                .map_err(|err| Error::parse("volume inspection", output, err))?;
            raw = items.into_iter().next().ok_or(Error::EmptyResult {
                what: "volume inspection",
            })?;
            Ok(Flow::Continue)
        })
        .finish()?;
    Ok(raw)
}

fn add(ctx: &Context, args: &VolumeAddArgs) -> Result<()> {
    let mut transport = runner::connect(ctx)?;

    println!("\nSkiff will create volume {}:\n", args.name);
    println!(" + volume {}\n", args.name);
    annotate(
        confirm_changes("create this volume", args.force, &mut PromptConfirm, &mut io::stdout()),
        "Could not add volume",
    )?;

    annotate(
        Pipeline::new(transport.as_mut())
            .run(create_command(args), |_| Ok(Flow::Continue))
            .finish(),
        "Could not add volume",
    )?;
    ui::success(&format!("Skiff created volume {}.", args.name));
    Ok(())
}

fn delete(ctx: &Context, name: &str, force: bool) -> Result<()> {
    let mut transport = runner::connect(ctx)?;

    println!("\nSkiff will delete volume {name}:\n");
    println!(" - volume {name}\n");
    annotate(
        confirm_changes("delete this volume", force, &mut PromptConfirm, &mut io::stdout()),
        "Could not delete volume",
    )?;

    annotate(
        Pipeline::new(transport.as_mut())
            .run(ShellCommand::new("docker volume rm").arg(name), |_| {
                Ok(Flow::Continue)
            })
            .finish(),
        "Could not delete volume",
    )?;
    ui::success(&format!("Skiff deleted volume {name}."));
    Ok(())
}

fn show(ctx: &Context, name: &str) -> Result<()> {
    let mut transport = runner::connect(ctx)?;
    let raw = annotate(
        inspect_volume(transport.as_mut(), name),
        "Could not inspect volume",
    )?;
    println!("{}", serde_json::to_string_pretty(&raw)?);
    Ok(())
}

fn list(ctx: &Context, json: bool) -> Result<()> {
    let mut transport = runner::connect(ctx)?;
    let volumes = annotate(list_volumes(transport.as_mut()), "Could not list volumes")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&volumes)?);
        return Ok(());
    }
    if volumes.is_empty() {
        if !ctx.quiet {
            ui::info("No volumes created");
        }
        return Ok(());
    }
    let rows: Vec<Vec<String>> = volumes
        .iter()
        .map(|volume| {
            vec![
                volume.name.clone(),
                volume.driver.clone(),
                volume.availability.clone(),
            ]
        })
        .collect();
    println!("{}", ui::format_table(&["NAME", "DRIVER", "AVAILABILITY"], &rows));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::MockTransport;

    #[test]
    fn test_create_command() {
        let args = VolumeAddArgs {
            name: "data".into(),
            driver: Some("local".into()),
            opts: vec!["type=nfs".into(), "o=addr=10.0.0.1,rw".into()],
            ..Default::default()
        };
        assert_eq!(
            create_command(&args).to_string(),
            "docker volume create --driver local --label skiff --name data \
             --opt type=nfs --opt o=addr=10.0.0.1,rw"
        );
    }

    #[test]
    fn test_create_command_cluster_flags() {
        let args = VolumeAddArgs {
            name: "shared".into(),
            availability: Some("active".into()),
            required_bytes: Some("1024".into()),
            sharing: Some("all".into()),
            access_type: Some("mount".into()),
            ..Default::default()
        };
        let command = create_command(&args);
        assert_eq!(command.flag_values("required-bytes").collect::<Vec<_>>(), vec!["1024"]);
        assert_eq!(command.flag_values("type").collect::<Vec<_>>(), vec!["mount"]);
        assert!(command.has_flag("availability"));
        assert!(!command.has_flag("group"));
    }

    #[test]
    fn test_list_volumes() {
        let output = concat!(
            r#"{"Name":"logs","Driver":"local","Availability":"","Size":"N/A"}"#,
            "\n",
            r#"{"Name":"data","Driver":"local","Availability":"","Size":"N/A"}"#,
            "\n"
        );
        let mut transport = MockTransport::new().respond(output);
        let volumes = list_volumes(&mut transport).unwrap();
        assert_eq!(
            volumes.iter().map(|v| v.name.as_str()).collect::<Vec<_>>(),
            vec!["data", "logs"]
        );
        assert_eq!(
            transport.commands(),
            ["docker volume ls --format json --filter label=skiff"]
        );
    }

    #[test]
    fn test_inspect_volume() {
        let mut transport =
            MockTransport::new().respond(r#"[{"Name":"data","Driver":"local"}]"#);
        let raw = inspect_volume(&mut transport, "data").unwrap();
        assert_eq!(raw["Driver"], "local");
        assert_eq!(transport.commands(), ["docker volume inspect data"]);

        let mut transport = MockTransport::new().respond("[]");
        assert!(matches!(
            inspect_volume(&mut transport, "data"),
            Err(Error::EmptyResult { .. })
        ));
    }
}
