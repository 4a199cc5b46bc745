//! Field-by-field diff of two service states
//!
//! Sequences compare as sets: reordering env entries or networks is not a
//! change. Values are rendered as JSON so strings stay quoted and lists
//! stay bracketed in the terminal output.

use crate::types::{DiffLine, DiffStatus, ServiceState};
use serde_json::Value;
use std::collections::BTreeSet;

/// Ordered diff lines plus the aggregate status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    lines: Vec<DiffLine>,
    status: DiffStatus,
}

impl Diff {
    pub fn lines(&self) -> &[DiffLine] {
        &self.lines
    }

    pub fn status(&self) -> DiffStatus {
        self.status
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Render all lines with aligned `=` signs, joined by newlines.
    pub fn render(&self) -> String {
        let width = self
            .lines
            .iter()
            .map(|line| line.left.len())
            .max()
            .unwrap_or(0);
        self.lines
            .iter()
            .map(|line| line.render(width))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn scalar(&mut self, label: &str, desired: &str, existing: &str) {
        if desired == existing {
            if !desired.is_empty() {
                self.push(label, Value::from(desired), DiffStatus::Same);
            }
        } else if existing.is_empty() {
            self.push(label, Value::from(desired), DiffStatus::Create);
        } else if desired.is_empty() {
            self.push(label, Value::from(existing), DiffStatus::Delete);
        } else {
            self.push(label, Value::from(existing), DiffStatus::Delete);
            self.push(label, Value::from(desired), DiffStatus::Create);
        }
    }

    fn flag(&mut self, label: &str, desired: bool, existing: bool) {
        match (desired, existing) {
            (true, true) => self.push(label, Value::Bool(true), DiffStatus::Same),
            (true, false) => self.push(label, Value::Bool(true), DiffStatus::Create),
            (false, true) => self.push(label, Value::Bool(true), DiffStatus::Delete),
            (false, false) => {}
        }
    }

    fn list(&mut self, label: &str, desired: &[String], existing: &[String]) {
        if same_set(desired, existing) {
            if !desired.is_empty() {
                self.push(label, Value::from(desired), DiffStatus::Same);
            }
        } else if existing.is_empty() {
            self.push(label, Value::from(desired), DiffStatus::Create);
        } else if desired.is_empty() {
            self.push(label, Value::from(existing), DiffStatus::Delete);
        } else {
            self.push(label, Value::from(existing), DiffStatus::Delete);
            self.push(label, Value::from(desired), DiffStatus::Create);
        }
    }

    fn push(&mut self, label: &str, value: Value, status: DiffStatus) {
        self.status = match status {
            DiffStatus::Same => self.status,
            DiffStatus::Create => self.status.with_create(),
            DiffStatus::Delete => self.status.with_delete(),
            DiffStatus::Update => DiffStatus::Update,
        };
        self.lines.push(DiffLine {
            left: label.to_string(),
            right: value.to_string(),
            status,
        });
    }
}

/// Whether two sequences hold the same elements, ignoring order.
pub fn same_set(left: &[String], right: &[String]) -> bool {
    left.iter().collect::<BTreeSet<_>>() == right.iter().collect::<BTreeSet<_>>()
}

/// Compare `desired` against `existing`, field by field in label order.
pub fn diff(desired: &ServiceState, existing: &ServiceState) -> Diff {
    let mut diff = Diff::default();
    diff.list("command", &desired.command, &existing.command);
    diff.list("env", &desired.env, &existing.env);
    diff.scalar("image", &desired.image, &existing.image);
    diff.flag("init", desired.init, existing.init);
    diff.list("mounts", &desired.mounts, &existing.mounts);
    diff.list("network", &desired.networks, &existing.networks);
    diff.list("publish", &desired.publish, &existing.publish);
    diff.scalar("replicas", &desired.replicas, &existing.replicas);
    diff.list("secret", &desired.secrets, &existing.secrets);
    diff.scalar("update-delay", &desired.update_delay, &existing.update_delay);
    diff.scalar(
        "update-failure-action",
        &desired.update_failure_action,
        &existing.update_failure_action,
    );
    diff.scalar("update-order", &desired.update_order, &existing.update_order);
    diff.scalar(
        "update-parallelism",
        &desired.update_parallelism,
        &existing.update_parallelism,
    );
    diff.scalar("user", &desired.user, &existing.user);
    diff.scalar("workdir", &desired.workdir, &existing.workdir);
    diff
}

impl ServiceState {
    /// Render the diff against `existing` and classify it.
    ///
    /// Diffing against `ServiceState::default()` renders every set field
    /// as an addition.
    pub fn diff(&self, existing: &ServiceState) -> (String, DiffStatus) {
        let diff = diff(self, existing);
        (diff.render(), diff.status())
    }
}
