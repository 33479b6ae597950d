//! Thin wrappers over `sysctl(3)`.

use std::ffi::CStr;
use std::io;
use std::ptr;

use libc::{c_int, c_void, size_t};

/// A sysctl node, addressed by name or by management information base.
#[derive(Debug, Clone, Copy)]
pub enum Oid<'a> {
    /// Dotted name such as `security.jail.list`.
    Name(&'a CStr),
    /// Numeric MIB.
    Mib(&'a [c_int]),
}

fn raw(oid: Oid<'_>, buf: *mut c_void, len: &mut size_t) -> io::Result<()> {
    let rc = match oid {
        // SAFETY: `name` is NUL-terminated, `len` is a valid out pointer and
        // `buf` is either null (size query) or points at `*len` writable bytes.
        Oid::Name(name) => unsafe { libc::sysctlbyname(name.as_ptr(), buf, len, ptr::null(), 0) },
        // SAFETY: as above; the MIB slice outlives the call.
        Oid::Mib(mib) => unsafe {
            libc::sysctl(
                mib.as_ptr(),
                u32::try_from(mib.len()).unwrap_or(u32::MAX),
                buf,
                len,
                ptr::null(),
                0,
            )
        },
    };
    if rc == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Returns how many bytes reading `oid` currently needs.
pub fn required_len(oid: Oid<'_>) -> io::Result<usize> {
    let mut len: size_t = 0;
    raw(oid, ptr::null_mut(), &mut len)?;
    Ok(len)
}

/// Reads `oid` into `buf`, returning the number of bytes written.
///
/// A buffer that became too small fails with `ENOMEM`.
pub fn read_into(oid: Oid<'_>, buf: &mut [u8]) -> io::Result<usize> {
    let mut len: size_t = buf.len();
    raw(oid, buf.as_mut_ptr().cast(), &mut len)?;
    Ok(len)
}

/// Reads `oid` completely, retrying while the value keeps growing.
pub fn read_growing(oid: Oid<'_>) -> io::Result<Vec<u8>> {
    loop {
        let len = required_len(oid)?;
        let mut buf = vec![0u8; len];
        match read_into(oid, &mut buf) {
            Ok(written) => {
                buf.truncate(written);
                return Ok(buf);
            }
            Err(e) if e.raw_os_error() == Some(libc::ENOMEM) => {}
            Err(e) => return Err(e),
        }
    }
}

/// Reads an integer-valued node.
pub fn read_int(name: &CStr) -> io::Result<c_int> {
    let mut value: c_int = 0;
    let mut len: size_t = std::mem::size_of::<c_int>();
    raw(Oid::Name(name), (&raw mut value).cast(), &mut len)?;
    Ok(value)
}
