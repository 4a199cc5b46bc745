//! Core types for service reconciliation

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Runtime default for `--update-delay`.
pub const DEFAULT_UPDATE_DELAY: &str = "0s";
/// Runtime default for `--update-failure-action`.
pub const DEFAULT_UPDATE_FAILURE_ACTION: &str = "pause";
/// Runtime default for `--update-order`.
pub const DEFAULT_UPDATE_ORDER: &str = "stop-first";
/// Runtime default for `--update-parallelism`.
pub const DEFAULT_UPDATE_PARALLELISM: &str = "1";

const FAILURE_ACTIONS: &[&str] = &["continue", "pause", "rollback"];
const UPDATE_ORDERS: &[&str] = &["start-first", "stop-first"];

// ============================================================================
// State model
// ============================================================================

/// Comparable snapshot of a service's observable configuration.
///
/// The same shape describes both what the operator wants and what the
/// remote orchestrator reports, so the two can be diffed field by field.
/// Scalars use the empty string for "unset". Update-policy fields are
/// empty when they hold the runtime default, and `image` never carries a
/// digest suffix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceState {
    pub command: Vec<String>,
    pub env: Vec<String>,
    pub image: String,
    pub init: bool,
    pub mounts: Vec<String>,
    pub networks: Vec<String>,
    pub publish: Vec<String>,
    pub replicas: String,
    pub secrets: Vec<String>,
    pub update_delay: String,
    pub update_failure_action: String,
    pub update_order: String,
    pub update_parallelism: String,
    pub user: String,
    pub workdir: String,
}

/// Rolling-update settings as the operator typed them.
///
/// `None` means "not specified", which resolves to the runtime default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdatePolicy {
    pub delay: Option<String>,
    pub failure_action: Option<String>,
    pub order: Option<String>,
    pub parallelism: Option<u64>,
}

/// What the operator asked for on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub env: Vec<String>,
    pub init: bool,
    pub mounts: Vec<String>,
    pub networks: Vec<String>,
    pub publish: Vec<String>,
    pub replicas: u64,
    pub secrets: Vec<String>,
    pub update: UpdatePolicy,
    /// `None` keeps whatever the running service has
    pub user: Option<String>,
    /// `None` keeps whatever the running service has
    pub workdir: Option<String>,
}

impl ServiceSpec {
    /// Resolve the desired [`ServiceState`] against the service that is
    /// currently running, if any.
    ///
    /// Init is monotonic: once a running service has it on, an unset flag
    /// does not turn it off. Unset user and workdir inherit the running
    /// value.
    pub fn desired_state(&self, existing: Option<&ServiceState>) -> Result<ServiceState> {
        let inherit = |value: &Option<String>, current: fn(&ServiceState) -> &String| {
            value
                .clone()
                .or_else(|| existing.map(|state| current(state).clone()))
                .unwrap_or_default()
        };

        Ok(ServiceState {
            command: self.command.clone(),
            env: self.env.clone(),
            image: normalize_image(&self.image),
            init: self.init || existing.is_some_and(|state| state.init),
            mounts: self.mounts.clone(),
            networks: self.networks.clone(),
            publish: self.publish.clone(),
            replicas: self.replicas.to_string(),
            secrets: self.secrets.clone(),
            update_delay: match &self.update.delay {
                Some(delay) => normalize_delay(delay)?,
                None => String::new(),
            },
            update_failure_action: match &self.update.failure_action {
                Some(action) => {
                    check_choice("update-failure-action", action, FAILURE_ACTIONS)?;
                    normalize_default(action, DEFAULT_UPDATE_FAILURE_ACTION)
                }
                None => String::new(),
            },
            update_order: match &self.update.order {
                Some(order) => {
                    check_choice("update-order", order, UPDATE_ORDERS)?;
                    normalize_default(order, DEFAULT_UPDATE_ORDER)
                }
                None => String::new(),
            },
            update_parallelism: self
                .update
                .parallelism
                .map(|n| normalize_default(&n.to_string(), DEFAULT_UPDATE_PARALLELISM))
                .unwrap_or_default(),
            user: inherit(&self.user, |state| &state.user),
            workdir: inherit(&self.workdir, |state| &state.workdir),
        })
    }
}

fn check_choice(field: &'static str, value: &str, allowed: &[&str]) -> Result<()> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(Error::InvalidSpec {
            field,
            message: format!("'{value}' is not one of {}", allowed.join(", ")),
        })
    }
}

// ============================================================================
// Normalization
// ============================================================================

/// Strip a `@sha256:...` digest so pinned and unpinned references compare equal.
pub fn normalize_image(image: &str) -> String {
    image.split('@').next().unwrap_or_default().to_string()
}

/// Map a runtime default to the empty string.
pub fn normalize_default(value: &str, default: &str) -> String {
    if value == default {
        String::new()
    } else {
        value.to_string()
    }
}

/// Normalize an operator-supplied delay such as `90s` to its canonical
/// form (`1m30s`). Zero becomes empty.
pub fn normalize_delay(value: &str) -> Result<String> {
    let nanos = parse_duration(value).ok_or_else(|| Error::InvalidSpec {
        field: "update-delay",
        message: format!("'{value}' is not a duration"),
    })?;
    Ok(delay_from_nanos(nanos))
}

/// Canonical form of a delay reported in nanoseconds. Zero becomes empty.
pub fn delay_from_nanos(nanos: u64) -> String {
    if nanos == 0 {
        String::new()
    } else {
        normalize_default(&format_duration(nanos), DEFAULT_UPDATE_DELAY)
    }
}

/// Format nanoseconds compactly: `1h`, `1m30s`, `10s`, `250ms`.
///
/// Whole seconds use hour/minute/second components with zero components
/// omitted. Anything else is written in the largest sub-second unit that
/// represents it exactly.
pub fn format_duration(nanos: u64) -> String {
    const SECOND: u64 = 1_000_000_000;

    if nanos == 0 {
        return DEFAULT_UPDATE_DELAY.to_string();
    }
    if nanos % SECOND != 0 {
        return if nanos % 1_000_000 == 0 {
            format!("{}ms", nanos / 1_000_000)
        } else if nanos % 1_000 == 0 {
            format!("{}us", nanos / 1_000)
        } else {
            format!("{nanos}ns")
        };
    }

    let secs = nanos / SECOND;
    let (hours, minutes, seconds) = (secs / 3600, secs / 60 % 60, secs % 60);
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if seconds > 0 {
        out.push_str(&format!("{seconds}s"));
    }
    out
}

/// Parse a duration like `1h30m`, `1.5s` or `250ms` into nanoseconds.
///
/// A bare `0` is accepted. Returns `None` for anything else without a unit.
pub fn parse_duration(input: &str) -> Option<u64> {
    let input = input.trim();
    if input == "0" {
        return Some(0);
    }
    if input.is_empty() {
        return None;
    }

    let is_number = |c: char| c.is_ascii_digit() || c == '.';
    let mut total = 0.0_f64;
    let mut rest = input;
    while !rest.is_empty() {
        let number_len = rest.find(|c: char| !is_number(c)).unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let value: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest.find(is_number).unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "h" => 3_600e9,
            "m" => 60e9,
            "s" => 1e9,
            "ms" => 1e6,
            "us" | "µs" => 1e3,
            "ns" => 1.0,
            _ => return None,
        };
        total += value * scale;
        rest = &rest[unit_len..];
    }

    Some(total.round() as u64)
}

// ============================================================================
// Diff primitives
// ============================================================================

/// Classification of a diff line, or of a whole diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffStatus {
    /// Nothing changes
    #[default]
    Same,
    /// Only additions
    Create,
    /// Only removals
    Delete,
    /// Additions and removals, or changed values
    Update,
}

impl DiffStatus {
    /// Marker printed in front of a diff line.
    pub fn symbol(self) -> char {
        match self {
            Self::Same => ' ',
            Self::Create => '+',
            Self::Delete => '-',
            Self::Update => '~',
        }
    }

    /// Fold an addition into an aggregate status.
    pub fn with_create(self) -> Self {
        match self {
            Self::Same | Self::Create => Self::Create,
            Self::Delete | Self::Update => Self::Update,
        }
    }

    /// Fold a removal into an aggregate status.
    pub fn with_delete(self) -> Self {
        match self {
            Self::Same | Self::Delete => Self::Delete,
            Self::Create | Self::Update => Self::Update,
        }
    }
}

/// One rendered line of a diff: a field label and its JSON-encoded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub left: String,
    pub right: String,
    pub status: DiffStatus,
}

impl DiffLine {
    /// Render with the label padded to `width` so `=` signs line up.
    pub fn render(&self, width: usize) -> String {
        format!(
            " {}   {:<width$} = {}",
            self.status.symbol(),
            self.left,
            self.right
        )
    }
}
