//! Escalating shutdown of one jail.
//!
//! A session walks the passes in a fixed order: the jail's shutdown
//! script, two rounds of `SIGTERM`, then `SIGKILL` when forcing is
//! enabled. After every pass and after every polling tick the jail is
//! looked at again, and the session ends as soon as it is empty.

use std::fmt;
use std::path::Path;

use jailctl_common::config::ShutdownConfig;
use jailctl_common::error::{JailError, Result};
use jailctl_core::signal::{Delivery, Signal};

use crate::host::ShutdownHost;

/// One step of the escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    /// Run the jail's shutdown script.
    GracefulScript,
    /// First round of `SIGTERM`.
    Terminate1,
    /// Second round of `SIGTERM`.
    Terminate2,
    /// `SIGKILL` everything left.
    ForceKill,
    /// Nothing more to try.
    GiveUp,
}

impl Pass {
    /// The pass that follows this one when the jail is still populated.
    #[must_use]
    pub const fn next(self, force: bool) -> Self {
        match self {
            Self::GracefulScript => Self::Terminate1,
            Self::Terminate1 => Self::Terminate2,
            Self::Terminate2 if force => Self::ForceKill,
            Self::Terminate2 | Self::ForceKill | Self::GiveUp => Self::GiveUp,
        }
    }

    /// Whether a polling window follows the pass.
    #[must_use]
    pub const fn waits(self) -> bool {
        matches!(self, Self::Terminate1 | Self::Terminate2 | Self::ForceKill)
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::GracefulScript => "graceful-script",
            Self::Terminate1 => "terminate-1",
            Self::Terminate2 => "terminate-2",
            Self::ForceKill => "force-kill",
            Self::GiveUp => "give-up",
        };
        f.write_str(s)
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The jail was observed empty.
    Stopped,
    /// Processes survived every pass.
    GaveUp,
}

/// Result of one shutdown session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Jail the session acted on.
    pub jail: String,
    /// How it ended.
    pub outcome: ShutdownOutcome,
    /// Escalation passes that actually ran, in order.
    pub passes: Vec<Pass>,
    /// Whether the start script ran successfully afterwards.
    pub restarted: bool,
}

impl ShutdownReport {
    /// Whether the jail ended up empty.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcome == ShutdownOutcome::Stopped
    }
}

/// Drives one jail through the shutdown passes.
pub struct ShutdownOrchestrator<'a, H: ShutdownHost + ?Sized> {
    host: &'a mut H,
    config: &'a ShutdownConfig,
}

impl<'a, H: ShutdownHost + ?Sized> ShutdownOrchestrator<'a, H> {
    /// Creates an orchestrator acting through `host`.
    pub const fn new(host: &'a mut H, config: &'a ShutdownConfig) -> Self {
        Self { host, config }
    }

    /// Stops `jail`, escalating until it is empty or every pass has run.
    ///
    /// Surviving processes are reported through
    /// [`ShutdownOutcome::GaveUp`], not as an error. When a restart was
    /// requested the start script runs afterwards whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot list the jail's processes, or
    /// [`JailError::Signal`] if a process refuses a signal for any reason
    /// other than having already exited. No restart is attempted then.
    pub fn shutdown(&mut self, jail: &str) -> Result<ShutdownReport> {
        let mut passes = Vec::new();
        let outcome = self.escalate(jail, &mut passes)?;
        tracing::info!(jail, ?outcome, passes = passes.len(), "shutdown finished");

        let config = self.config;
        let restarted = config.restart && self.run_script(jail, &config.start_script);
        Ok(ShutdownReport {
            jail: jail.to_string(),
            outcome,
            passes,
            restarted,
        })
    }

    fn escalate(&mut self, jail: &str, passes: &mut Vec<Pass>) -> Result<ShutdownOutcome> {
        if self.is_empty()? {
            tracing::debug!(jail, "jail already empty");
            return Ok(ShutdownOutcome::Stopped);
        }

        let config = self.config;
        let mut pass = Pass::GracefulScript;
        loop {
            tracing::debug!(jail, %pass, "running pass");
            match pass {
                Pass::GracefulScript => {
                    if config.use_scripts {
                        let _ = self.run_script(jail, &config.shutdown_script);
                    }
                }
                Pass::Terminate1 | Pass::Terminate2 => self.signal_all(Signal::SIGTERM)?,
                Pass::ForceKill => {
                    if !self.config.quiet {
                        tracing::warn!(jail, "jail won't stop. forcing jail termination...");
                    }
                    self.signal_all(Signal::SIGKILL)?;
                }
                Pass::GiveUp => {
                    if !self.config.quiet {
                        tracing::warn!(jail, "couldn't stop jail, processes wouldn't die");
                    }
                    return Ok(ShutdownOutcome::GaveUp);
                }
            }
            passes.push(pass);

            if self.is_empty()? {
                return Ok(ShutdownOutcome::Stopped);
            }
            if pass.waits() {
                for _ in 0..self.config.timeout_secs {
                    self.host.tick();
                    if self.is_empty()? {
                        return Ok(ShutdownOutcome::Stopped);
                    }
                }
            }
            pass = pass.next(self.config.force);
        }
    }

    fn is_empty(&mut self) -> Result<bool> {
        Ok(self.host.occupants()?.is_empty())
    }

    fn signal_all(&mut self, sig: Signal) -> Result<()> {
        for process in self.host.occupants()? {
            match self.host.signal(process.pid, sig)? {
                Delivery::Delivered => tracing::debug!(pid = process.pid, signal = %sig, "signalled"),
                Delivery::Gone => tracing::debug!(pid = process.pid, "already exited"),
            }
        }
        Ok(())
    }

    /// Runs a script if it checks out; every failure is a warning.
    fn run_script(&mut self, jail: &str, script: &Path) -> bool {
        let quiet = self.config.quiet;
        if let Err(e) = self.host.check_script(script) {
            if !quiet {
                match &e {
                    JailError::ExecValidation { .. } => {
                        tracing::warn!(jail, script = %script.display(), "can't execute in jail: {e}");
                    }
                    _ => tracing::warn!(jail, script = %script.display(), error = %e, "can't check script"),
                }
            }
            return false;
        }
        match self.host.run_script(script) {
            Ok(true) => true,
            Ok(false) => {
                if !quiet {
                    tracing::warn!(jail, script = %script.display(), "script exited with failure");
                }
                false
            }
            Err(e) => {
                if !quiet {
                    tracing::warn!(jail, script = %script.display(), error = %e, "script failed to run");
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_escalate_in_order() {
        assert_eq!(Pass::GracefulScript.next(true), Pass::Terminate1);
        assert_eq!(Pass::Terminate1.next(true), Pass::Terminate2);
        assert_eq!(Pass::Terminate2.next(true), Pass::ForceKill);
        assert_eq!(Pass::ForceKill.next(true), Pass::GiveUp);
    }

    #[test]
    fn force_kill_is_skipped_without_force() {
        assert_eq!(Pass::Terminate2.next(false), Pass::GiveUp);
    }

    #[test]
    fn script_pass_opens_no_window() {
        assert!(!Pass::GracefulScript.waits());
        assert!(Pass::Terminate1.waits());
        assert!(Pass::ForceKill.waits());
        assert!(!Pass::GiveUp.waits());
    }

    #[test]
    fn report_success_follows_outcome() {
        let report = ShutdownReport {
            jail: "web1".into(),
            outcome: ShutdownOutcome::GaveUp,
            passes: vec![Pass::GracefulScript],
            restarted: false,
        };
        assert!(!report.succeeded());
        assert_eq!(Pass::ForceKill.to_string(), "force-kill");
    }
}
