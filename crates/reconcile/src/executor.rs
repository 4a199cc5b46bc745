//! Reconciliation drivers
//!
//! Each driver reads remote state, shows the operator what will change,
//! asks for confirmation, then runs the converging commands through one
//! [`Pipeline`]. Progress text goes to a caller-supplied writer.

use crate::context::ConfirmCallback;
use crate::diff::{self, Diff};
use crate::error::{Error, Result};
use crate::inspect::{self, ServiceListing};
use crate::pipeline::{Flow, Pipeline};
use crate::planner::{self, PlanKind};
use crate::shell::ShellCommand;
use crate::transport::Transport;
use crate::types::{DiffStatus, ServiceSpec, ServiceState, normalize_image};
use std::io::Write;

/// Prompt shown before reading the confirmation response.
pub const PROMPT: &str = "  Enter a value";

/// Everything the deploy driver needs besides its collaborators.
#[derive(Debug, Clone, Default)]
pub struct DeployRequest {
    pub spec: ServiceSpec,
    /// Skip the confirmation gate
    pub force: bool,
}

/// What a successful deploy did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub kind: PlanKind,
    pub status: DiffStatus,
    /// The converging command as sent to the transport
    pub command: String,
}

pub fn pull_command(image: &str) -> ShellCommand {
    ShellCommand::new("docker image pull").switch("quiet").arg(image)
}

/// Create or update a service to match `request.spec`.
pub fn deploy<C, W>(
    transport: &mut dyn Transport,
    request: &DeployRequest,
    confirm: &mut C,
    out: &mut W,
) -> Result<Deployment>
where
    C: ConfirmCallback + ?Sized,
    W: Write + ?Sized,
{
    let name = &request.spec.name;
    let existing = match inspect::find_service(transport, name)? {
        Some(_) => Some(inspect::read_state(transport, name)?),
        None => None,
    };

    let desired = request.spec.desired_state(existing.as_ref())?;
    let plan = planner::plan(name, &desired, existing.as_ref());
    let diff = diff::diff(&desired, &existing.clone().unwrap_or_default());
    log::debug!("planned {:?} of {name} ({:?})", plan.kind, diff.status());

    let headline = match (plan.kind, diff.status()) {
        (PlanKind::Create, _) => format!("Skiff will create {name}:"),
        (PlanKind::Update, DiffStatus::Same) => {
            format!("Skiff will deploy {name} without changes:")
        }
        (PlanKind::Update, _) => format!("Skiff will update {name}:"),
    };
    let symbol = match plan.kind {
        PlanKind::Create => DiffStatus::Create.symbol(),
        PlanKind::Update if diff.status() == DiffStatus::Same => DiffStatus::Same.symbol(),
        PlanKind::Update => DiffStatus::Update.symbol(),
    };
    write_summary(out, &headline, symbol, name, &diff)?;
    confirm_changes("run this deployment", request.force, confirm, out)?;

    writeln!(out, "Deploying...")?;
    let command = plan.command.to_string();
    Pipeline::new(transport)
        .run(pull_command(&desired.image), |_| Ok(Flow::Continue))
        .run(&command, |_| Ok(Flow::Continue))
        .finish()?;
    writeln!(out, "Skiff deployed {name}.")?;

    Ok(Deployment {
        kind: plan.kind,
        status: diff.status(),
        command,
    })
}

/// Pull the service's image again and force its tasks to restart.
pub fn redeploy<C, W>(
    transport: &mut dyn Transport,
    name: &str,
    force: bool,
    confirm: &mut C,
    out: &mut W,
) -> Result<()>
where
    C: ConfirmCallback + ?Sized,
    W: Write + ?Sized,
{
    let listing = require_service(transport, name)?;
    let state = inspect::read_state(transport, name)?;

    let diff = diff::diff(&state, &state);
    let headline = format!("Skiff will redeploy {name}:");
    write_summary(out, &headline, DiffStatus::Update.symbol(), name, &diff)?;
    confirm_changes("run this redeployment", force, confirm, out)?;

    writeln!(out, "Redeploying...")?;
    Pipeline::new(transport)
        .run(pull_command(&normalize_image(&listing.image)), |_| {
            Ok(Flow::Continue)
        })
        .run(
            ShellCommand::new("docker service update")
                .switch("force")
                .arg(name),
            |_| Ok(Flow::Continue),
        )
        .finish()?;
    writeln!(out, "Skiff redeployed {name}.")?;
    Ok(())
}

/// Remove a managed service.
pub fn remove<C, W>(
    transport: &mut dyn Transport,
    name: &str,
    force: bool,
    confirm: &mut C,
    out: &mut W,
) -> Result<()>
where
    C: ConfirmCallback + ?Sized,
    W: Write + ?Sized,
{
    require_service(transport, name)?;
    let state = inspect::read_state(transport, name)?;

    let diff = diff::diff(&ServiceState::default(), &state);
    let headline = format!("Skiff will delete {name}:");
    write_summary(out, &headline, DiffStatus::Delete.symbol(), name, &diff)?;
    confirm_changes("delete this service", force, confirm, out)?;

    writeln!(out, "Deleting...")?;
    Pipeline::new(transport)
        .run(ShellCommand::new("docker service rm").arg(name), |_| {
            Ok(Flow::Continue)
        })
        .finish()?;
    writeln!(out, "Skiff deleted {name}.")?;
    Ok(())
}

/// Print the current state of a service as a diff against itself.
pub fn describe<W>(transport: &mut dyn Transport, name: &str, out: &mut W) -> Result<ServiceState>
where
    W: Write + ?Sized,
{
    require_service(transport, name)?;
    let state = inspect::read_state(transport, name)?;
    let headline = format!("Current state of {name}:");
    write_summary(out, &headline, DiffStatus::Same.symbol(), name, &diff::diff(&state, &state))?;
    Ok(state)
}

/// Print the approval prompt and wait for a response.
///
/// `force` skips the prompt. Anything but `yes` is [`Error::Declined`].
pub fn confirm_changes<C, W>(action: &str, force: bool, confirm: &mut C, out: &mut W) -> Result<()>
where
    C: ConfirmCallback + ?Sized,
    W: Write + ?Sized,
{
    if force {
        writeln!(out, "Confirmations skipped.")?;
        return Ok(());
    }

    writeln!(out, "Do you want Skiff to {action}?")?;
    writeln!(out, "  Type 'yes' to approve, or anything else to deny.")?;
    out.flush()?;
    if confirm.confirm(PROMPT)? {
        writeln!(out)?;
        Ok(())
    } else {
        Err(Error::Declined)
    }
}

fn require_service(transport: &mut dyn Transport, name: &str) -> Result<ServiceListing> {
    inspect::find_service(transport, name)?.ok_or_else(|| Error::NotFound {
        name: name.to_string(),
    })
}

fn write_summary<W>(out: &mut W, headline: &str, symbol: char, name: &str, diff: &Diff) -> Result<()>
where
    W: Write + ?Sized,
{
    writeln!(out, "\n{headline}\n")?;
    writeln!(out, " {symbol} service {name}:")?;
    if !diff.is_empty() {
        writeln!(out, "{}", diff.render())?;
    }
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AutoConfirm, AutoDecline, LineConfirm};
    use crate::inspect::tests::{INSPECT_FULL, INSPECT_PLAIN, NETWORKS, listing};
    use crate::transport::MockTransport;
    use std::io::Cursor;

    fn request(name: &str, image: &str) -> DeployRequest {
        DeployRequest {
            spec: ServiceSpec {
                name: name.into(),
                image: image.into(),
                command: ["python3", "-m", "http.server", "80"]
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
                replicas: 1,
                ..Default::default()
            },
            force: false,
        }
    }

    fn existing_plain() -> MockTransport {
        MockTransport::new()
            .respond_to(
                "docker service ls",
                listing("fake-service", "python:3.12@sha256:0123"),
            )
            .respond_to("docker service inspect", INSPECT_PLAIN)
    }

    #[test]
    fn test_deploy_creates_missing_service() {
        let mut mock = MockTransport::new();
        let mut out = Vec::new();
        let deployment = deploy(
            &mut mock,
            &request("web", "python:3.12"),
            &mut AutoConfirm,
            &mut out,
        )
        .unwrap();

        assert_eq!(deployment.kind, PlanKind::Create);
        assert_eq!(deployment.status, DiffStatus::Create);
        assert_eq!(mock.commands().len(), 3);
        assert!(mock.commands()[0].starts_with("docker service ls"));
        assert_eq!(mock.commands()[1], "docker image pull --quiet python:3.12");
        assert!(mock.commands()[2].starts_with("docker service create"));
        assert!(!mock.ran("docker service inspect"));

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Skiff will create web:"));
        assert!(out.contains(" + service web:"));
        assert!(out.contains(" +   image    = \"python:3.12\""));
        assert!(out.contains("Do you want Skiff to run this deployment?"));
        assert!(out.ends_with("Skiff deployed web.\n"));
    }

    #[test]
    fn test_deploy_digest_only_difference_is_same() {
        let mut mock = existing_plain();
        let mut out = Vec::new();
        let mut req = request("fake-service", "python:3.12");
        req.force = true;
        let deployment = deploy(&mut mock, &req, &mut AutoDecline, &mut out).unwrap();

        assert_eq!(deployment.kind, PlanKind::Update);
        assert_eq!(deployment.status, DiffStatus::Same);
        assert_eq!(
            deployment.command,
            "docker service update --detach --quiet --image python:3.12 fake-service"
        );
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Skiff will deploy fake-service without changes:"));
        assert!(out.contains("     image    = \"python:3.12\""));
        assert!(!out.contains(" +   "));
        assert!(!out.contains(" -   "));
        assert!(out.contains("Confirmations skipped."));
    }

    #[test]
    fn test_deploy_update_emits_deltas() {
        let mut mock = MockTransport::new()
            .respond_to("docker service ls", listing("web", "nginx:1.27"))
            .respond_to("docker service inspect", INSPECT_FULL)
            .respond_to("docker network ls", NETWORKS);
        let mut req = request("web", "nginx:1.28");
        req.spec.command.clear();
        req.spec.env = vec!["A=1".into(), "C=3".into()];
        req.spec.networks = vec!["default".into(), "backend".into()];
        req.spec.replicas = 3;
        req.force = true;
        let mut out = Vec::new();
        let deployment = deploy(&mut mock, &req, &mut AutoDecline, &mut out).unwrap();

        assert_eq!(deployment.status, DiffStatus::Update);
        assert!(deployment.command.contains("--env-rm B"));
        assert!(deployment.command.contains("--env-add C=3"));
        assert!(deployment.command.contains("--image nginx:1.28"));
        assert!(!deployment.command.contains("network-"));
        assert!(!deployment.command.contains("--replicas"));
        // Unset user, workdir and init are kept from the running service.
        assert!(!deployment.command.contains("--user"));
        assert!(!deployment.command.contains("--workdir"));
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Skiff will update web:"));
        assert!(out.contains(" ~ service web:"));
    }

    #[test]
    fn test_declined_issues_no_mutations() {
        let mut mock = MockTransport::new();
        let mut confirm = LineConfirm::new(Cursor::new("no\n"), std::io::sink());
        let mut out = Vec::new();
        let err = deploy(
            &mut mock,
            &request("web", "python:3.12"),
            &mut confirm,
            &mut out,
        )
        .unwrap_err();

        assert!(err.is_declined());
        assert!(!mock.ran("docker image pull"));
        assert!(!mock.ran("docker service create"));
        assert!(!mock.ran("docker service update"));
    }

    #[test]
    fn test_remote_failure_carries_command() {
        let mut mock = MockTransport::new().fail_on("docker service create");
        let mut out = Vec::new();
        let err = deploy(
            &mut mock,
            &request("web", "python:3.12"),
            &mut AutoConfirm,
            &mut out,
        )
        .unwrap_err();
        match err {
            Error::CommandFailed { command, .. } => {
                assert!(command.starts_with("docker service create"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let out = String::from_utf8(out).unwrap();
        assert!(!out.contains("Skiff deployed"));
    }

    #[test]
    fn test_invalid_spec_fails_before_prompt() {
        let mut mock = MockTransport::new();
        let mut req = request("web", "python:3.12");
        req.spec.update.delay = Some("soon".into());
        let mut out = Vec::new();
        let err = deploy(&mut mock, &req, &mut AutoConfirm, &mut out).unwrap_err();
        assert!(matches!(err, Error::InvalidSpec { .. }));
        assert!(!mock.ran("docker image pull"));
    }

    #[test]
    fn test_describe_output() {
        let mut mock = existing_plain();
        let mut out = Vec::new();
        describe(&mut mock, "fake-service", &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\nCurrent state of fake-service:\n\n   service fake-service:\n     command  = [\"python3\",\"-m\",\"http.server\",\"80\"]\n     image    = \"python:3.12\"\n     replicas = \"1\"\n\n"
        );
    }

    #[test]
    fn test_describe_missing_service() {
        let mut mock = MockTransport::new();
        let err = describe(&mut mock, "ghost", &mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::NotFound { name } if name == "ghost"));
    }

    #[test]
    fn test_redeploy() {
        let mut mock = existing_plain();
        let mut out = Vec::new();
        redeploy(&mut mock, "fake-service", true, &mut AutoDecline, &mut out).unwrap();
        assert!(mock.ran("docker image pull --quiet python:3.12"));
        assert_eq!(
            mock.commands().last().unwrap(),
            "docker service update --force fake-service"
        );
        assert!(String::from_utf8(out).unwrap().contains("Skiff redeployed fake-service."));
    }

    #[test]
    fn test_remove() {
        let mut mock = existing_plain();
        let mut out = Vec::new();
        remove(&mut mock, "fake-service", false, &mut AutoConfirm, &mut out).unwrap();
        assert_eq!(mock.commands().last().unwrap(), "docker service rm fake-service");
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains(" - service fake-service:"));
        assert!(out.contains(" -   image    = \"python:3.12\""));
    }

    #[test]
    fn test_remove_declined() {
        let mut mock = existing_plain();
        let err = remove(&mut mock, "fake-service", false, &mut AutoDecline, &mut Vec::new())
            .unwrap_err();
        assert!(err.is_declined());
        assert!(!mock.ran("docker service rm"));
    }
}
