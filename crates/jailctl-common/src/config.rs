//! Configuration models threaded through the runtime entry points.
//!
//! Every knob that influences a shutdown lives in one value built by the
//! caller, so that two sessions against different jails never share state.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{JailError, Result};

/// Settings for one stop invocation.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Ticks (seconds) to wait after each terminate or kill pass.
    pub timeout_secs: u32,
    /// Suppress warnings.
    pub quiet: bool,
    /// Duplicate script output to stderr.
    pub verbose: bool,
    /// Escalate to `SIGKILL` when terminate passes fail.
    pub force: bool,
    /// Run the start script once the shutdown finishes.
    pub restart: bool,
    /// Run the shutdown script as the first pass.
    pub use_scripts: bool,
    /// Orderly shutdown script, as seen from inside the jail.
    pub shutdown_script: PathBuf,
    /// Start script, as seen from inside the jail.
    pub start_script: PathBuf,
    /// Interpreter for both scripts.
    pub shell: PathBuf,
    /// Owner a script must have to be trusted.
    pub trusted_uid: u32,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: constants::DEFAULT_STOP_TIMEOUT_SECS,
            quiet: false,
            verbose: false,
            force: false,
            restart: false,
            use_scripts: true,
            shutdown_script: PathBuf::from(constants::SHUTDOWN_SCRIPT),
            start_script: PathBuf::from(constants::START_SCRIPT),
            shell: PathBuf::from(constants::DEFAULT_SHELL),
            trusted_uid: constants::TRUSTED_UID,
        }
    }
}

impl ShutdownConfig {
    /// Checks that the combination of settings is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout is zero or a restart is requested
    /// while scripts are disabled.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(JailError::Config {
                message: "timeout must be at least one second".into(),
            });
        }
        if self.restart && !self.use_scripts {
            return Err(JailError::Config {
                message: "restart needs the start script, scripts are disabled".into(),
            });
        }
        Ok(())
    }
}

/// Settings for signal-only mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Suppress warnings.
    pub quiet: bool,
    /// Command name fragment identifying the supervisor process.
    pub supervisor_command: String,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            quiet: false,
            supervisor_command: constants::SUPERVISOR_COMMAND.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_rc_layout() {
        let cfg = ShutdownConfig::default();
        assert_eq!(cfg.timeout_secs, 3);
        assert!(cfg.use_scripts);
        assert!(!cfg.force);
        assert_eq!(cfg.shutdown_script, PathBuf::from("/etc/rc.shutdown"));
        assert_eq!(cfg.start_script, PathBuf::from("/etc/rc"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let cfg = ShutdownConfig {
            timeout_secs: 0,
            ..ShutdownConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(JailError::Config { .. })));
    }

    #[test]
    fn restart_without_scripts_is_rejected() {
        let cfg = ShutdownConfig {
            restart: true,
            use_scripts: false,
            ..ShutdownConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn signal_config_targets_jailer() {
        assert_eq!(SignalConfig::default().supervisor_command, "jailer");
    }
}
