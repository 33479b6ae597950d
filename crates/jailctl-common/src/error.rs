//! Unified error types for the jailctl workspace.
//!
//! The variants follow how a failure is handled rather than where it
//! happened: kernel query, version skew and jail attach failures abort the
//! whole invocation, per-target failures are reported and the remaining targets
//! are still processed. A process that vanishes before it can be signalled
//! is not an error at all and never reaches this type.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum JailError {
    /// The kernel could not list jails or processes.
    #[error("couldn't query kernel: {message}")]
    KernelQuery {
        /// What the kernel query was for and why it failed.
        message: String,
    },

    /// A kernel record carried a structure version this build does not
    /// understand.
    #[error("kernel and userland out of sync: {message}")]
    VersionSkew {
        /// Details about the mismatching record.
        message: String,
    },

    /// A name or numeric id did not resolve to a live jail.
    #[error("unknown jail host name: {key}")]
    UnknownContainer {
        /// The key as given by the caller.
        key: String,
    },

    /// A numeric key was not a valid jail id.
    #[error("invalid jail id: {key}")]
    InvalidId {
        /// The offending key.
        key: String,
    },

    /// A script or command failed validation and will not be run.
    #[error("can't execute {path}: {reason}")]
    ExecValidation {
        /// Path of the rejected executable.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },

    /// A command could not be spawned or waited on.
    #[error("error executing {path}: {source}")]
    Exec {
        /// Path of the command.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Signal delivery failed for a reason other than the target being gone.
    #[error("couldn't signal process {pid}: {message}")]
    Signal {
        /// Target process id.
        pid: u32,
        /// Description of the failure.
        message: String,
    },

    /// Signal-only mode found no supervisor process in the jail.
    #[error("{jail}: jailer not running in jail")]
    SupervisorNotRunning {
        /// Target jail name.
        jail: String,
    },

    /// The calling process could not change into a jail's context.
    #[error("couldn't attach to jail {jid}: {message}")]
    Context {
        /// Numeric id of the target jail.
        jid: u32,
        /// Description of the failure.
        message: String,
    },

    /// A forked worker stopped on a fatal error it already reported.
    #[error("{jail}: worker aborted on a fatal error")]
    WorkerAborted {
        /// Jail the worker acted on.
        jail: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },
}

impl JailError {
    /// Returns whether this error means the environment itself is broken
    /// and the whole invocation must stop, not just the current target.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::KernelQuery { .. }
                | Self::VersionSkew { .. }
                | Self::Context { .. }
                | Self::WorkerAborted { .. }
        )
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, JailError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_failures_are_fatal() {
        let skew = JailError::VersionSkew {
            message: "record version 7".into(),
        };
        assert!(skew.is_fatal());
        assert!(
            JailError::KernelQuery {
                message: "EPERM".into()
            }
            .is_fatal()
        );
    }

    #[test]
    fn failing_to_enter_a_jail_is_fatal() {
        let attach = JailError::Context {
            jid: 4,
            message: "Operation not permitted".into(),
        };
        assert!(attach.is_fatal());
        assert!(JailError::WorkerAborted { jail: "web1".into() }.is_fatal());
    }

    #[test]
    fn per_target_failures_are_not_fatal() {
        let unknown = JailError::UnknownContainer { key: "web1".into() };
        assert!(!unknown.is_fatal());
        assert_eq!(unknown.to_string(), "unknown jail host name: web1");
        let denied = JailError::Signal {
            pid: 12,
            message: "EPERM".into(),
        };
        assert!(!denied.is_fatal());
    }

    #[test]
    fn supervisor_message_names_the_jail() {
        let err = JailError::SupervisorNotRunning { jail: "web1".into() };
        assert_eq!(err.to_string(), "web1: jailer not running in jail");
    }
}
