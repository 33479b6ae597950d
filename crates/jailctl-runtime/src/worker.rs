//! Scoped workers: run a closure in a forked child and await its status.
//!
//! Attaching to a jail cannot be undone, so work that must happen inside
//! one runs in a child process. The child runs a pre-spawn hook (the
//! attach) and then the body; the parent only waits.

use std::io::Write;
use std::panic::{self, AssertUnwindSafe};

use jailctl_common::error::{JailError, Result};
use nix::errno::Errno;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork};

/// Status reported for a worker whose hook failed or that died abnormally.
pub const WORKER_FAILED: i32 = 1;

/// Status reported for a worker that hit an error which must abort the
/// whole invocation. The worker logs the error itself before exiting.
pub const WORKER_FATAL: i32 = 70;

/// Runs `hook` then `body` in a child process and returns the child's
/// exit status.
///
/// The body's return value becomes the exit status. A failing hook skips
/// the body and yields [`WORKER_FATAL`] for a fatal error (such as a
/// refused attach) and [`WORKER_FAILED`] otherwise. Death by signal is
/// also [`WORKER_FAILED`].
///
/// The calling process must be single-threaded.
///
/// # Errors
///
/// Returns [`JailError::Exec`] only when the fork or the wait itself
/// fails.
pub fn run_scoped<H, B>(hook: H, body: B) -> Result<i32>
where
    H: FnOnce() -> Result<()>,
    B: FnOnce() -> i32,
{
    // SAFETY: the child only runs the given closures and then `_exit`s; it
    // never returns into the caller's stack frames. Callers are
    // single-threaded, so no lock can be held by a thread that vanished.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            let code = panic::catch_unwind(AssertUnwindSafe(|| match hook() {
                Ok(()) => body(),
                Err(e) => {
                    tracing::error!(error = %e, "worker setup failed");
                    if e.is_fatal() { WORKER_FATAL } else { WORKER_FAILED }
                }
            }))
            .unwrap_or(WORKER_FAILED);
            let _ = std::io::stdout().flush();
            let _ = std::io::stderr().flush();
            // SAFETY: `_exit` skips atexit handlers and destructors that
            // belong to the parent's copy of the process state.
            unsafe { libc::_exit(code) }
        }
        Ok(ForkResult::Parent { child }) => await_child(child),
        Err(e) => Err(JailError::Exec {
            path: "fork".into(),
            source: e.into(),
        }),
    }
}

fn await_child(child: Pid) -> Result<i32> {
    loop {
        match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(code),
            Ok(WaitStatus::Signaled(_, sig, _)) => {
                tracing::warn!(pid = child.as_raw(), signal = %sig, "worker killed by signal");
                return Ok(WORKER_FAILED);
            }
            Ok(_) | Err(Errno::EINTR) => {}
            Err(e) => {
                return Err(JailError::Exec {
                    path: "waitpid".into(),
                    source: e.into(),
                });
            }
        }
    }
}
