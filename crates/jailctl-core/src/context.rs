//! Entering a jail's execution context.
//!
//! Attaching is one-way: once the calling process is inside a jail it only
//! sees that jail's processes and filesystem, and it cannot leave again.

use jailctl_common::error::{JailError, Result};
use jailctl_common::types::JailId;

/// Moves the calling process into jail `id`.
///
/// # Errors
///
/// Returns [`JailError::Context`] if the kernel refuses the attach.
#[cfg(target_os = "freebsd")]
pub fn enter_container_context(id: JailId) -> Result<()> {
    let jid = libc::c_int::try_from(id.get()).map_err(|_| JailError::Context {
        jid: id.get(),
        message: "jail id out of range".into(),
    })?;
    // SAFETY: jail_attach only reads its integer argument.
    if unsafe { libc::jail_attach(jid) } == -1 {
        return Err(JailError::Context {
            jid: id.get(),
            message: std::io::Error::last_os_error().to_string(),
        });
    }
    tracing::debug!(jid, "attached to jail");
    Ok(())
}

/// Stub for platforms without jails.
///
/// # Errors
///
/// Always returns an error, attaching requires FreeBSD.
#[cfg(not(target_os = "freebsd"))]
pub fn enter_container_context(id: JailId) -> Result<()> {
    Err(JailError::Context {
        jid: id.get(),
        message: "jails require FreeBSD".into(),
    })
}

/// Returns whether the calling process already runs inside a jail.
///
/// # Errors
///
/// Returns [`JailError::KernelQuery`] if the kernel cannot be asked.
#[cfg(target_os = "freebsd")]
pub fn running_in_jail() -> Result<bool> {
    crate::sysctl::read_int(c"security.jail.jailed")
        .map(|v| v != 0)
        .map_err(|e| JailError::KernelQuery {
            message: format!("couldn't check jail status: {e}"),
        })
}

/// Processes are never jailed off FreeBSD.
///
/// # Errors
///
/// Never fails on this platform.
#[cfg(not(target_os = "freebsd"))]
pub fn running_in_jail() -> Result<bool> {
    Ok(false)
}
