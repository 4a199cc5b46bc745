//! Error types for reconciliation.
//!
//! Errors are categorized so the CLI can give appropriate feedback: a
//! remote command that failed reads differently from a payload the reader
//! could not make sense of, or from an operator who declined a deployment.

use thiserror::Error;

/// Categories of reconciliation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A remote (or local) command exited unsuccessfully
    Remote,
    /// Inspection output could not be decoded
    Parse,
    /// The named service does not exist
    NotFound,
    /// The desired service description is invalid
    InvalidSpec,
    /// The operator declined the confirmation gate
    Declined,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Remote => "Remote command failed",
            Self::Parse => "Unexpected inspection output",
            Self::NotFound => "Service not found",
            Self::InvalidSpec => "Invalid service description",
            Self::Declined => "Deployment canceled",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Remote => "Check that the machine is reachable and docker is running",
            Self::Parse => "Check the docker version on the machine",
            Self::NotFound => "Run `skiff service list` to see deployed services",
            Self::InvalidSpec => "Fix the flagged value and try again",
            Self::Declined => "No changes were made",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur while reading, planning, or converging a service.
#[derive(Debug, Error)]
pub enum Error {
    /// A command exited unsuccessfully or could not be started
    #[error("failed to run '{command}': {message}")]
    CommandFailed {
        /// The command line as sent to the transport
        command: String,
        /// Captured stderr or the launch failure
        message: String,
    },

    /// Command output was not the JSON we expected
    #[error("could not parse {what}: {source}\n{payload}")]
    Parse {
        /// What was being decoded (e.g. "service inspection")
        what: &'static str,
        /// The raw payload, shortened to [`PAYLOAD_LIMIT`] bytes
        payload: String,
        /// Underlying decode error
        #[source]
        source: serde_json::Error,
    },

    /// A query that must return at least one element returned none
    #[error("empty {what} result")]
    EmptyResult {
        /// What was being queried
        what: &'static str,
    },

    /// No managed service with this name exists
    #[error("no service named '{name}'")]
    NotFound {
        /// Requested service name
        name: String,
    },

    /// A field of the desired service could not be normalized
    #[error("invalid {field}: {message}")]
    InvalidSpec {
        /// Flag or field name
        field: &'static str,
        /// What was wrong with it
        message: String,
    },

    /// Confirmation response was not "yes"
    #[error("deployment canceled because response did not match 'yes'")]
    Declined,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a [`Error::Parse`] from a failed decode of `payload`.
    pub fn parse(what: &'static str, payload: &str, source: serde_json::Error) -> Self {
        log::debug!("undecodable {what} payload: {payload}");
        Error::Parse {
            what,
            payload: truncate(payload.trim(), PAYLOAD_LIMIT),
            source,
        }
    }

    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::CommandFailed { .. } => ErrorCategory::Remote,
            Error::Parse { .. } | Error::EmptyResult { .. } => ErrorCategory::Parse,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::InvalidSpec { .. } => ErrorCategory::InvalidSpec,
            Error::Declined => ErrorCategory::Declined,
            Error::Io(_) | Error::Other(_) => ErrorCategory::Other,
        }
    }

    /// Whether the operator declined the confirmation gate.
    pub fn is_declined(&self) -> bool {
        self.category() == ErrorCategory::Declined
    }
}

/// Longest payload carried in a parse error.
pub const PAYLOAD_LIMIT: usize = 2048;

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes total)", &text[..end], text.len())
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;
