//! Signal-only mode: hand one signal to the process supervising a jail.
//!
//! This bypasses the shutdown passes entirely. The supervisor decides
//! what the signal means, typically halting or rebooting the jail.

use jailctl_common::config::SignalConfig;
use jailctl_common::error::{JailError, Result};
use jailctl_core::signal::{Delivery, Signal};

use crate::host::ShutdownHost;

/// Sends `sig` to the supervisor of `jail` and returns its pid.
///
/// The supervisor is the last occupant whose command name contains
/// `config.supervisor_command`. Nothing is signalled when there is none.
///
/// # Errors
///
/// Returns [`JailError::SupervisorNotRunning`] if no occupant matches or it
/// exited before the signal arrived, and any error from listing or
/// signalling.
pub fn signal_supervisor<H: ShutdownHost + ?Sized>(
    host: &mut H,
    jail: &str,
    sig: Signal,
    config: &SignalConfig,
) -> Result<u32> {
    let not_running = || JailError::SupervisorNotRunning { jail: jail.into() };

    let supervisor = host
        .occupants()?
        .into_iter()
        .rev()
        .find(|p| p.command.contains(config.supervisor_command.as_str()));
    let Some(supervisor) = supervisor else {
        if !config.quiet {
            tracing::warn!(jail, "{} not running in jail", config.supervisor_command);
        }
        return Err(not_running());
    };

    match host.signal(supervisor.pid, sig)? {
        Delivery::Delivered => {
            tracing::info!(jail, pid = supervisor.pid, signal = %sig, "supervisor signalled");
            Ok(supervisor.pid)
        }
        Delivery::Gone => Err(not_running()),
    }
}
