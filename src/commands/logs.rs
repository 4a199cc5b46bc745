//! `skiff logs` and the log command builder shared with `task logs`

use crate::Context;
use crate::cli::{LogOptions, LogsArgs};
use crate::commands::annotate;
use crate::runner;
use anyhow::{Result, bail};
use reconcile::shell::quote;
use reconcile::types::parse_duration;
use reconcile::{Flow, Pipeline, ShellCommand};

pub fn run(ctx: &Context, args: &LogsArgs) -> Result<()> {
    let command = service_logs_command(&args.name, &args.options)?;
    print_logs(ctx, &command)
}

/// Run a logs command and print what it returns, stderr included.
pub fn print_logs(ctx: &Context, command: &ShellCommand) -> Result<()> {
    let mut transport = runner::connect(ctx)?;
    annotate(
        Pipeline::new(transport.as_mut())
            .run(format!("{command} 2>&1"), |output| {
                print!("{output}");
                Ok(Flow::Continue)
            })
            .finish(),
        "Could not fetch logs",
    )?;
    Ok(())
}

/// `docker service logs` without task-name prefixes.
pub fn service_logs_command(name: &str, options: &LogOptions) -> Result<ShellCommand> {
    let command = ShellCommand::new("docker service logs")
        .switch_if(options.follow, "follow")
        .switch("no-trunc")
        .switch("raw");
    bounded(finish(command, name, options), options)
}

/// `docker container logs` for one task container.
pub fn container_logs_command(id: &str, options: &LogOptions) -> Result<ShellCommand> {
    let command =
        ShellCommand::new("docker container logs").switch_if(options.follow, "follow");
    bounded(finish(command, id, options), options)
}

fn finish(command: ShellCommand, target: &str, options: &LogOptions) -> ShellCommand {
    command
        .flag_if(
            options.tail.is_some(),
            "tail",
            options.tail.map(|n| n.to_string()).unwrap_or_default(),
        )
        .switch_if(options.timestamps, "timestamps")
        .arg(target)
}

/// Bound a followed command by `timeout` so a forgotten session does not
/// hold the connection open forever.
fn bounded(mut command: ShellCommand, options: &LogOptions) -> Result<ShellCommand> {
    if options.follow && !options.timeout.is_empty() {
        let Some(nanos) = parse_duration(&options.timeout) else {
            bail!("Invalid --timeout '{}'", options.timeout);
        };
        let seconds = nanos.div_ceil(1_000_000_000).max(1);
        command.name = format!(
            "timeout --verbose {} {}",
            quote(&format!("{seconds}s")),
            command.name
        );
    }
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(follow: bool) -> LogOptions {
        LogOptions {
            follow,
            tail: Some(50),
            timestamps: true,
            timeout: "1h".into(),
        }
    }

    #[test]
    fn test_service_logs_command() {
        assert_eq!(
            service_logs_command("web", &options(false)).unwrap().to_string(),
            "docker service logs --no-trunc --raw --tail 50 --timestamps web"
        );
    }

    #[test]
    fn test_follow_is_bounded() {
        assert_eq!(
            service_logs_command("web", &options(true)).unwrap().to_string(),
            "timeout --verbose 3600s docker service logs --follow --no-trunc --raw --tail 50 --timestamps web"
        );
    }

    #[test]
    fn test_container_logs_command() {
        let mut options = options(true);
        options.timeout = "90s".into();
        options.tail = None;
        assert_eq!(
            container_logs_command("3f2a", &options).unwrap().to_string(),
            "timeout --verbose 90s docker container logs --follow --timestamps 3f2a"
        );
    }

    #[test]
    fn test_bad_timeout() {
        let mut options = options(true);
        options.timeout = "forever".into();
        assert!(service_logs_command("web", &options).is_err());
        assert!(container_logs_command("3f2a", &options).is_err());
    }
}
