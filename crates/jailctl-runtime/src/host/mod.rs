//! The view of the machine a shutdown session acts through.

pub mod system;

use std::path::Path;

use jailctl_common::error::Result;
use jailctl_common::types::ProcessRecord;
use jailctl_core::signal::{Delivery, Signal};

pub use self::system::{Scope, SystemHost};

/// Everything the orchestrator and signal-only mode need from the host.
///
/// Implementors decide which processes count as occupants of the jail
/// being acted on. Every call observes the host afresh; nothing is cached
/// between calls.
pub trait ShutdownHost {
    /// Lists the processes currently running in the jail.
    ///
    /// # Errors
    ///
    /// Returns [`JailError::KernelQuery`](jailctl_common::error::JailError::KernelQuery)
    /// if the process listing fails.
    fn occupants(&mut self) -> Result<Vec<ProcessRecord>>;

    /// Delivers `sig` to `pid`.
    ///
    /// # Errors
    ///
    /// Returns an error for any failure other than the process being gone.
    fn signal(&mut self, pid: u32, sig: Signal) -> Result<Delivery>;

    /// Checks that `script` may be run.
    ///
    /// # Errors
    ///
    /// Returns [`JailError::ExecValidation`](jailctl_common::error::JailError::ExecValidation)
    /// when the script is missing or untrusted.
    fn check_script(&self, script: &Path) -> Result<()>;

    /// Runs `script` to completion and reports whether it succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error if the script could not be started.
    fn run_script(&mut self, script: &Path) -> Result<bool>;

    /// Blocks for one polling tick.
    fn tick(&mut self);
}
