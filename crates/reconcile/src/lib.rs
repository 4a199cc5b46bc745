//! # Reconcile
//!
//! Converge container services on a remote swarm to a desired description.
//!
//! ## Core Concepts
//!
//! - **ServiceState**: comparable snapshot of a service's configuration,
//!   used for both the desired and the running side
//! - **Diff**: field-by-field comparison with an aggregate status
//! - **Plan**: the single create or update command that converges a service
//! - **Pipeline**: sequential remote commands with a quiet stop channel
//! - **Transport**: where commands run (SSH, local shell, or a mock)
//!
//! ## Example
//!
//! ```ignore
//! use reconcile::{AutoConfirm, DeployRequest, MockTransport, ServiceSpec, deploy};
//!
//! let mut transport = MockTransport::new();
//! let request = DeployRequest {
//!     spec: ServiceSpec {
//!         name: "web".into(),
//!         image: "nginx:1.27".into(),
//!         replicas: 1,
//!         ..Default::default()
//!     },
//!     force: true,
//! };
//! let deployment = deploy(&mut transport, &request, &mut AutoConfirm, &mut std::io::stdout())?;
//! println!("ran: {}", deployment.command);
//! ```

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod inspect;
pub mod pipeline;
pub mod planner;
pub mod shell;
pub mod transport;
pub mod types;

// Re-export main types at crate root
pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, LineConfirm, is_yes};
pub use diff::{Diff, diff, same_set};
pub use error::{Error, ErrorCategory, Result};
pub use executor::{
    DeployRequest, Deployment, PROMPT, confirm_changes, deploy, describe, redeploy, remove,
};
pub use inspect::{LABEL, ServiceSummary, TASK_LABEL, list_services, read_state};
pub use pipeline::{Completion, Flow, Halt, Pipeline, skip_reset};
pub use planner::{Plan, PlanKind, plan, plan_create, plan_task, plan_update};
pub use shell::{ShellArg, ShellCommand, ShellFlag, quote};
pub use transport::{MockTransport, Transport};
pub use types::{DiffLine, DiffStatus, ServiceSpec, ServiceState, UpdatePolicy};
