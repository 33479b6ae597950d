//! Signal delivery to jailed processes.
//!
//! Every listing is stale by the time it is acted on, so a target that
//! exited before delivery counts as delivered.

use std::str::FromStr;

use jailctl_common::error::{JailError, Result};
use nix::errno::Errno;
use nix::sys::signal::{self, SigHandler};
use nix::unistd::Pid;

pub use nix::sys::signal::Signal;

/// Signals that would otherwise take down a process supervising a jail
/// from inside it, while the jail's own scripts signal everything.
const JOB_SIGNALS: [Signal; 3] = [Signal::SIGHUP, Signal::SIGPIPE, Signal::SIGTERM];

/// What happened to a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The kernel accepted the signal.
    Delivered,
    /// The process no longer exists.
    Gone,
}

/// Sends `sig` to `pid`.
///
/// # Errors
///
/// Returns [`JailError::Signal`] for any failure other than the process
/// being gone, e.g. a permission error.
pub fn send(pid: u32, sig: Signal) -> Result<Delivery> {
    let raw = i32::try_from(pid).map_err(|_| JailError::Signal {
        pid,
        message: "pid out of range".into(),
    })?;
    match signal::kill(Pid::from_raw(raw), sig) {
        Ok(()) => {
            tracing::debug!(pid, signal = %sig, "signal delivered");
            Ok(Delivery::Delivered)
        }
        Err(Errno::ESRCH) => {
            tracing::debug!(pid, signal = %sig, "process already gone");
            Ok(Delivery::Gone)
        }
        Err(e) => Err(JailError::Signal {
            pid,
            message: e.desc().into(),
        }),
    }
}

/// Parses a signal name with or without its `SIG` prefix, or a number.
///
/// # Errors
///
/// Returns [`JailError::Config`] for anything that is not a signal.
pub fn parse(name: &str) -> Result<Signal> {
    let name = name.trim();
    let parsed = if let Ok(n) = name.parse::<i32>() {
        Signal::try_from(n).ok()
    } else {
        let upper = name.to_ascii_uppercase();
        let full = if upper.starts_with("SIG") {
            upper
        } else {
            format!("SIG{upper}")
        };
        Signal::from_str(&full).ok()
    };
    parsed.ok_or_else(|| JailError::Config {
        message: format!("unknown signal: {name}"),
    })
}

/// Ignores hangup, broken pipe and terminate in the calling process.
///
/// # Errors
///
/// Returns [`JailError::Config`] if a disposition cannot be changed.
pub fn ignore_job_signals() -> Result<()> {
    set_job_dispositions(SigHandler::SigIgn)
}

/// Restores the default disposition of the signals
/// [`ignore_job_signals`] ignores.
///
/// Only async-signal-safe calls are made, so this may run between
/// `fork` and `exec`.
///
/// # Errors
///
/// Returns [`JailError::Config`] if a disposition cannot be changed.
pub fn restore_job_signals() -> Result<()> {
    set_job_dispositions(SigHandler::SigDfl)
}

fn set_job_dispositions(handler: SigHandler) -> Result<()> {
    for sig in JOB_SIGNALS {
        // SAFETY: `SigIgn` and `SigDfl` install no Rust handler, so no
        // signal-safety requirements apply to code run on delivery.
        let _ = unsafe { signal::signal(sig, handler) }.map_err(|e| JailError::Config {
            message: format!("couldn't set disposition of {sig}: {e}"),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_names_and_numbers() {
        assert_eq!(parse("TERM").unwrap(), Signal::SIGTERM);
        assert_eq!(parse("sighup").unwrap(), Signal::SIGHUP);
        assert_eq!(parse("SIGQUIT").unwrap(), Signal::SIGQUIT);
        assert_eq!(parse("9").unwrap(), Signal::SIGKILL);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(parse("NOPE"), Err(JailError::Config { .. })));
        assert!(parse("999").is_err());
    }

    #[test]
    fn exited_process_is_gone_not_an_error() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        let _ = child.wait().unwrap();
        assert_eq!(send(pid, Signal::SIGTERM).unwrap(), Delivery::Gone);
    }

    #[test]
    fn live_process_receives_signal() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let delivery = send(child.id(), Signal::SIGKILL).unwrap();
        let _ = child.wait();
        assert_eq!(delivery, Delivery::Delivered);
    }
}
