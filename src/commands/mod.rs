// Service lifecycle (run, redeploy, delete, list, inspect)
pub mod service;

// Log fetching
pub mod logs;

// Machine registry and setup
pub mod machine;

// Overlay networks
pub mod network;

// Cluster and local volumes
pub mod volume;

// One-off tasks
pub mod task;

// Swarm secrets
pub mod secret;

// Registry credentials
pub mod login;

/// Attach a one-line annotation to a failed operation.
///
/// A declined confirmation is reported as is.
pub fn annotate<T>(result: reconcile::Result<T>, message: &str) -> anyhow::Result<T> {
    result.map_err(|err| {
        if err.is_declined() {
            anyhow::Error::new(err)
        } else {
            anyhow::Error::new(err).context(message.to_string())
        }
    })
}
