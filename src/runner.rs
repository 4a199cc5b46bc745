//! Command transports for the CLI
//!
//! [`SshTransport`] runs commands on a registered machine through the
//! system `ssh` client. [`LocalTransport`] runs them through `sh -c` on
//! this host.

use crate::Context;
use crate::registry::{Machine, Registry};
use anyhow::Result;
use reconcile::Transport;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Seconds an idle control master outlives its last command.
const CONTROL_PERSIST_SECS: u16 = 60;

static NEXT_CONTROL_ID: AtomicUsize = AtomicUsize::new(0);

/// Runs commands on a remote machine over SSH.
///
/// The first command opens a control master and later commands reuse its
/// connection. The master is closed when the transport is dropped.
#[derive(Debug)]
pub struct SshTransport {
    destination: String,
    port: u16,
    identity_file: PathBuf,
    connect_timeout_secs: u16,
    control_path: PathBuf,
    connected: bool,
}

impl SshTransport {
    pub fn for_machine(machine: &Machine) -> Self {
        let id = NEXT_CONTROL_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            destination: machine.destination(),
            port: machine.port,
            identity_file: machine.key_path.clone(),
            connect_timeout_secs: 10,
            control_path: std::env::temp_dir()
                .join(format!("skiff-{}-{id}.sock", std::process::id())),
            connected: false,
        }
    }

    fn ssh_base(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-p").arg(self.port.to_string());
        cmd.arg("-i").arg(&self.identity_file);
        cmd.arg("-o").arg("IdentitiesOnly=yes");
        cmd.arg("-o").arg("BatchMode=yes");
        cmd.arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout_secs));
        cmd.arg("-o").arg("StrictHostKeyChecking=accept-new");
        cmd.arg("-o").arg("ControlMaster=auto");
        cmd.arg("-o")
            .arg(format!("ControlPath={}", self.control_path.display()));
        cmd.arg("-o")
            .arg(format!("ControlPersist={CONTROL_PERSIST_SECS}"));
        cmd
    }

    /// `ssh -O exit`, asking the control master to shut down.
    fn exit_command(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg(format!("ControlPath={}", self.control_path.display()));
        cmd.arg("-O").arg("exit").arg(&self.destination);
        cmd
    }
}

impl SshTransport {
    fn remote(&mut self, command: &str) -> Command {
        if !self.connected {
            log::debug!("ssh {} (port {})", self.destination, self.port);
        }
        self.connected = true;
        let mut cmd = self.ssh_base();
        cmd.arg("--").arg(&self.destination).arg(command);
        cmd
    }
}

impl Transport for SshTransport {
    fn exec(&mut self, command: &str) -> reconcile::Result<String> {
        run_capture(self.remote(command), command, None)
    }

    fn exec_with_input(&mut self, command: &str, input: &[u8]) -> reconcile::Result<String> {
        run_capture(self.remote(command), command, Some(input))
    }
}

impl Drop for SshTransport {
    fn drop(&mut self) {
        if !self.connected {
            return;
        }
        let status = self
            .exit_command()
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(err) = status {
            log::debug!("could not close ssh control master: {err}");
        }
    }
}

/// Runs commands on this host.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTransport;

impl LocalTransport {
    fn shell(command: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

impl Transport for LocalTransport {
    fn exec(&mut self, command: &str) -> reconcile::Result<String> {
        run_capture(Self::shell(command), command, None)
    }

    fn exec_with_input(&mut self, command: &str, input: &[u8]) -> reconcile::Result<String> {
        run_capture(Self::shell(command), command, Some(input))
    }
}

/// Run `cmd` to completion, returning stdout or a failure carrying stderr.
///
/// `input`, when given, is written to stdin and stdin is then closed.
fn run_capture(mut cmd: Command, command: &str, input: Option<&[u8]>) -> reconcile::Result<String> {
    let launch_failed = |err: io::Error| reconcile::Error::CommandFailed {
        command: command.to_string(),
        message: format!("failed to execute: {err}"),
    };

    let output = match input {
        None => cmd.stdin(Stdio::null()).output().map_err(launch_failed)?,
        Some(input) => {
            let mut child = cmd
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(launch_failed)?;
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input).map_err(launch_failed)?;
            }
            child.wait_with_output().map_err(launch_failed)?
        }
    };

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(reconcile::Error::CommandFailed {
            command: command.to_string(),
            message: format!("{} ({})", stderr.trim(), output.status),
        })
    }
}

/// Open a transport to the machine selected by `--machine`, the registry
/// default, or this host with `--local`.
pub fn connect(ctx: &Context) -> Result<Box<dyn Transport>> {
    if ctx.local {
        log::debug!("Using local transport");
        return Ok(Box::new(LocalTransport));
    }

    let registry = Registry::load(&ctx.registry_path)?;
    let machine = registry.resolve(ctx.machine.as_deref())?;
    log::info!("Using machine {} ({})", machine.name, machine.destination());
    Ok(Box::new(SshTransport::for_machine(machine)))
}
