//! Registry login and logout on the machine
//!
//! The password never appears on a command line: it is written to the
//! stdin of `docker login --password-stdin`.

use crate::Context;
use crate::cli::LoginArgs;
use crate::commands::annotate;
use crate::paths;
use crate::runner;
use crate::ui;
use anyhow::{Context as _, Result, bail};
use reconcile::{Flow, Pipeline, ShellCommand, Transport};
use std::fs;
use std::io::{self, Read};

/// Registry shown when none is given.
pub const DEFAULT_REGISTRY: &str = "docker.io";

pub fn login_command(username: &str, registry: Option<&str>) -> ShellCommand {
    ShellCommand::new("docker login")
        .flag("username", username)
        .switch("password-stdin")
        .arg_if(registry.is_some(), registry.unwrap_or_default())
}

pub fn logout_command(registry: Option<&str>) -> ShellCommand {
    ShellCommand::new("docker logout").arg_if(registry.is_some(), registry.unwrap_or_default())
}

pub fn log_in(
    transport: &mut dyn Transport,
    username: &str,
    password: &str,
    registry: Option<&str>,
) -> reconcile::Result<()> {
    Pipeline::new(transport)
        .run_with_input(
            login_command(username, registry),
            password.as_bytes(),
            |_| Ok(Flow::Continue),
        )
        .finish()?;
    Ok(())
}

pub fn log_out(transport: &mut dyn Transport, registry: Option<&str>) -> reconcile::Result<()> {
    Pipeline::new(transport)
        .run(logout_command(registry), |_| Ok(Flow::Continue))
        .finish()?;
    Ok(())
}

/// Password from `source`, or from stdin when it is `-`.
///
/// One trailing line break is dropped.
pub fn read_password(source: &str) -> Result<String> {
    let mut password = String::new();
    if source == "-" {
        io::stdin()
            .read_to_string(&mut password)
            .context("Failed to read password from stdin")?;
    } else {
        let path = paths::expand(source);
        password = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read password file: {}", path.display()))?;
    }

    let password = password
        .strip_suffix('\n')
        .map(|rest| rest.strip_suffix('\r').unwrap_or(rest))
        .unwrap_or(password.as_str())
        .to_string();
    if password.is_empty() {
        bail!("Password is empty");
    }
    Ok(password)
}

pub fn login(ctx: &Context, args: &LoginArgs) -> Result<()> {
    let password = read_password(&args.password_file)?;
    let mut transport = runner::connect(ctx)?;
    let registry = args.registry.as_deref();
    annotate(
        log_in(transport.as_mut(), &args.username, &password, registry),
        "Could not log in",
    )?;
    ui::success(&format!(
        "Machine logged into {} as {}",
        registry.unwrap_or(DEFAULT_REGISTRY),
        args.username
    ));
    Ok(())
}

pub fn logout(ctx: &Context, registry: Option<&str>) -> Result<()> {
    let mut transport = runner::connect(ctx)?;
    annotate(log_out(transport.as_mut(), registry), "Could not log out")?;
    ui::success(&format!(
        "Machine logged out of {}",
        registry.unwrap_or(DEFAULT_REGISTRY)
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::MockTransport;
    use tempfile::TempDir;

    #[test]
    fn test_password_goes_to_stdin() {
        let mut transport = MockTransport::new().with_default("Login Succeeded");
        log_in(&mut transport, "deploy", "s3cret", Some("ghcr.io")).unwrap();
        assert_eq!(
            transport.commands(),
            ["docker login --username deploy --password-stdin ghcr.io"]
        );
        assert_eq!(transport.inputs(), ["s3cret"]);
        assert!(!transport.commands()[0].contains("s3cret"));
    }

    #[test]
    fn test_default_registry_is_omitted() {
        assert_eq!(
            login_command("deploy", None).to_string(),
            "docker login --username deploy --password-stdin"
        );
        assert_eq!(logout_command(None).to_string(), "docker logout");
        assert_eq!(
            logout_command(Some("ghcr.io")).to_string(),
            "docker logout ghcr.io"
        );
    }

    #[test]
    fn test_failed_login_reports_command() {
        let mut transport = MockTransport::new().fail_on("docker login");
        let err = log_in(&mut transport, "deploy", "wrong", None).unwrap_err();
        assert!(err.to_string().contains("docker login --username deploy"));
    }

    #[test]
    fn test_read_password_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token");
        fs::write(&path, "abc123\r\n").unwrap();
        assert_eq!(read_password(&path.to_string_lossy()).unwrap(), "abc123");

        fs::write(&path, "\n").unwrap();
        assert!(read_password(&path.to_string_lossy()).is_err());
        assert!(read_password(&dir.path().join("missing").to_string_lossy()).is_err());
    }
}
