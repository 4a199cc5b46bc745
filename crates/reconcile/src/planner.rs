//! Command planner
//!
//! Turns a desired [`ServiceState`] into the single orchestrator command
//! that converges the service: a create when nothing runs under that
//! name, otherwise an update carrying only the deltas.

use crate::diff::same_set;
use crate::inspect::{SERVICE_LABEL, TASK_LABEL};
use crate::shell::{self, ShellCommand};
use crate::types::{
    DEFAULT_UPDATE_DELAY, DEFAULT_UPDATE_FAILURE_ACTION, DEFAULT_UPDATE_ORDER,
    DEFAULT_UPDATE_PARALLELISM, ServiceState,
};
use std::collections::BTreeSet;

pub const CREATE: &str = "docker service create";
pub const UPDATE: &str = "docker service update";

/// Whether a plan creates or updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    Create,
    Update,
}

/// The command that converges one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub kind: PlanKind,
    pub command: ShellCommand,
}

/// Plan a create or an update depending on whether `existing` is known.
pub fn plan(name: &str, desired: &ServiceState, existing: Option<&ServiceState>) -> Plan {
    match existing {
        Some(existing) => plan_update(name, desired, existing),
        None => plan_create(name, desired),
    }
}

/// Full create command: every set field becomes a flag.
pub fn plan_create(name: &str, desired: &ServiceState) -> Plan {
    Plan {
        kind: PlanKind::Create,
        command: create_command(SERVICE_LABEL, name, desired),
    }
}

/// Create command for a one-off task: an unnamed service whose tasks are
/// never restarted once they exit.
pub fn plan_task(desired: &ServiceState) -> Plan {
    let command = create_command(TASK_LABEL, "", desired)
        .switch("no-healthcheck")
        .flag("container-label", TASK_LABEL)
        .flag("restart-condition", "none");
    Plan {
        kind: PlanKind::Create,
        command,
    }
}

fn create_command(label: &str, name: &str, desired: &ServiceState) -> ShellCommand {
    let command = ShellCommand::new(CREATE)
        .switch("detach")
        .switch("quiet")
        .flag("label", label)
        .flag_if(!name.is_empty(), "name", name)
        .flag_each("env", &desired.env)
        .switch_if(desired.init, "init")
        .flag_each("mount", &desired.mounts)
        .flag_each("network", &desired.networks)
        .flag_each("publish", &desired.publish)
        .flag_if(!desired.replicas.is_empty(), "replicas", &desired.replicas)
        .flag_each("secret", &desired.secrets)
        .flag_if(
            !desired.update_delay.is_empty(),
            "update-delay",
            &desired.update_delay,
        )
        .flag_if(
            !desired.update_failure_action.is_empty(),
            "update-failure-action",
            &desired.update_failure_action,
        )
        .flag_if(
            !desired.update_order.is_empty(),
            "update-order",
            &desired.update_order,
        )
        .flag_if(
            !desired.update_parallelism.is_empty(),
            "update-parallelism",
            &desired.update_parallelism,
        )
        .flag_if(!desired.user.is_empty(), "user", &desired.user)
        .flag_if(!desired.workdir.is_empty(), "workdir", &desired.workdir);

    desired
        .command
        .iter()
        .fold(command.arg(&desired.image), |command, word| command.arg(word))
}

/// Delta update command against the running service.
///
/// Sequence fields emit `--X-rm` for removed elements and `--X-add` for
/// new ones. Changed scalars emit one flag, falling back to the runtime
/// default when the desired value is empty. The image is always sent so
/// a moved tag is re-resolved.
pub fn plan_update(name: &str, desired: &ServiceState, existing: &ServiceState) -> Plan {
    let mut command = ShellCommand::new(UPDATE).switch("detach").switch("quiet");

    if !same_set(&desired.command, &existing.command) {
        command = command.flag_allow_empty("args", shell::join(&desired.command));
    }

    let added_env = difference(&desired.env, &existing.env);
    let added_keys: BTreeSet<&str> = added_env.iter().map(|entry| env_key(entry)).collect();
    let removed_keys: Vec<&str> = difference(&existing.env, &desired.env)
        .into_iter()
        .map(env_key)
        .filter(|key| !added_keys.contains(key))
        .collect();
    command = command
        .flag_each("env-rm", removed_keys)
        .flag_each("env-add", added_env);

    command = command
        .flag("image", &desired.image)
        .switch_if(desired.init && !existing.init, "init");

    command = command
        .flag_each(
            "mount-rm",
            difference(&existing.mounts, &desired.mounts)
                .into_iter()
                .map(mount_target),
        )
        .flag_each("mount-add", difference(&desired.mounts, &existing.mounts));

    command = set_delta(command, "network", &desired.networks, &existing.networks);
    command = set_delta(command, "publish", &desired.publish, &existing.publish);

    command = command.flag_if(
        desired.replicas != existing.replicas && !desired.replicas.is_empty(),
        "replicas",
        &desired.replicas,
    );

    command = set_delta(command, "secret", &desired.secrets, &existing.secrets);

    command = scalar_with_default(
        command,
        "update-delay",
        &desired.update_delay,
        &existing.update_delay,
        DEFAULT_UPDATE_DELAY,
    );
    command = scalar_with_default(
        command,
        "update-failure-action",
        &desired.update_failure_action,
        &existing.update_failure_action,
        DEFAULT_UPDATE_FAILURE_ACTION,
    );
    command = scalar_with_default(
        command,
        "update-order",
        &desired.update_order,
        &existing.update_order,
        DEFAULT_UPDATE_ORDER,
    );
    command = scalar_with_default(
        command,
        "update-parallelism",
        &desired.update_parallelism,
        &existing.update_parallelism,
        DEFAULT_UPDATE_PARALLELISM,
    );

    if desired.user != existing.user {
        command = command.flag_allow_empty("user", &desired.user);
    }
    if desired.workdir != existing.workdir {
        command = command.flag_allow_empty("workdir", &desired.workdir);
    }

    Plan {
        kind: PlanKind::Update,
        command: command.arg(name),
    }
}

/// Elements of `left` missing from `right`, first occurrence order, deduplicated.
fn difference<'a>(left: &'a [String], right: &[String]) -> Vec<&'a str> {
    let right: BTreeSet<&str> = right.iter().map(String::as_str).collect();
    let mut seen = BTreeSet::new();
    left.iter()
        .map(String::as_str)
        .filter(|value| !right.contains(value) && seen.insert(*value))
        .collect()
}

fn set_delta(command: ShellCommand, field: &str, desired: &[String], existing: &[String]) -> ShellCommand {
    command
        .flag_each(&format!("{field}-rm"), difference(existing, desired))
        .flag_each(&format!("{field}-add"), difference(desired, existing))
}

fn scalar_with_default(
    command: ShellCommand,
    flag: &str,
    desired: &str,
    existing: &str,
    default: &str,
) -> ShellCommand {
    if desired == existing {
        return command;
    }
    let value = if desired.is_empty() { default } else { desired };
    command.flag(flag, value)
}

/// `KEY` of a `KEY=VALUE` entry.
fn env_key(entry: &str) -> &str {
    entry.split_once('=').map_or(entry, |(key, _)| key)
}

/// Target path of a `type=bind,source=...,target=...` mount, or the whole
/// spec when no target is named.
fn mount_target(spec: &str) -> &str {
    spec.split(',')
        .filter_map(|part| part.split_once('='))
        .find(|(key, _)| matches!(*key, "target" | "dst" | "destination"))
        .map_or(spec, |(_, value)| value)
}
