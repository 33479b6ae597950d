//! Where record streams come from.

use jailctl_common::error::{JailError, Result};

/// Outcome of filling a caller-sized buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetch {
    /// The stream fit; this many bytes were written.
    Filled(usize),
    /// The stream grew past the buffer since it was sized.
    TooSmall,
}

/// A provider of the kernel's jail record stream.
pub trait RecordSource {
    /// Returns the buffer size the stream currently needs.
    ///
    /// # Errors
    ///
    /// Returns [`JailError::KernelQuery`] if the kernel refuses the query.
    fn required_len(&self) -> Result<usize>;

    /// Copies the stream into `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`JailError::KernelQuery`] for any failure other than the
    /// buffer being too small.
    fn fetch(&self, buf: &mut [u8]) -> Result<Fetch>;
}

/// The `security.jail.list` sysctl.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysctlJailList;

#[cfg(target_os = "freebsd")]
const JAIL_LIST: &std::ffi::CStr = c"security.jail.list";

#[cfg(target_os = "freebsd")]
impl RecordSource for SysctlJailList {
    fn required_len(&self) -> Result<usize> {
        crate::sysctl::required_len(crate::sysctl::Oid::Name(JAIL_LIST)).map_err(|e| {
            JailError::KernelQuery {
                message: format!("couldn't list jails: {e}"),
            }
        })
    }

    fn fetch(&self, buf: &mut [u8]) -> Result<Fetch> {
        match crate::sysctl::read_into(crate::sysctl::Oid::Name(JAIL_LIST), buf) {
            Ok(written) => Ok(Fetch::Filled(written)),
            Err(e) if e.raw_os_error() == Some(libc::ENOMEM) => Ok(Fetch::TooSmall),
            Err(e) => Err(JailError::KernelQuery {
                message: format!("couldn't list jails: {e}"),
            }),
        }
    }
}

/// Stub for platforms without jails.
#[cfg(not(target_os = "freebsd"))]
impl RecordSource for SysctlJailList {
    fn required_len(&self) -> Result<usize> {
        Err(JailError::KernelQuery {
            message: "jail enumeration requires FreeBSD".into(),
        })
    }

    fn fetch(&self, _buf: &mut [u8]) -> Result<Fetch> {
        Err(JailError::KernelQuery {
            message: "jail enumeration requires FreeBSD".into(),
        })
    }
}

#[cfg(all(test, not(target_os = "freebsd")))]
mod tests {
    use super::*;

    #[test]
    fn sysctl_source_is_unavailable_off_freebsd() {
        assert!(matches!(
            SysctlJailList.required_len(),
            Err(JailError::KernelQuery { .. })
        ));
    }
}
