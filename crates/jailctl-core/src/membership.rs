//! Which jail a process belongs to.
//!
//! The jail name is the last whitespace-delimited token of the process's
//! status file. Only a bounded window at the end of the file is read.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use jailctl_common::constants::{PROCFS_ROOT, STATUS_WINDOW};

/// Resolves process ids to jail names through procfs status files.
#[derive(Debug, Clone)]
pub struct MembershipResolver {
    root: PathBuf,
}

impl MembershipResolver {
    /// Resolves against status files below `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves against the host's procfs.
    #[must_use]
    pub fn procfs() -> Self {
        Self::new(PROCFS_ROOT)
    }

    /// Returns the status file of `pid`.
    #[must_use]
    pub fn status_path(&self, pid: u32) -> PathBuf {
        self.root.join(pid.to_string()).join("status")
    }

    /// Returns the name of the jail `pid` runs in.
    ///
    /// Returns `None` if the status file cannot be read, for example
    /// because the process exited, or holds no token at all.
    #[must_use]
    pub fn resolve(&self, pid: u32) -> Option<String> {
        let path = self.status_path(pid);
        let mut file = File::open(&path).ok()?;
        match trailing_token(&mut file) {
            Ok(name) => name,
            Err(e) => {
                tracing::debug!(pid, path = %path.display(), error = %e, "status unreadable");
                None
            }
        }
    }
}

impl Default for MembershipResolver {
    fn default() -> Self {
        Self::procfs()
    }
}

/// Reads the last [`STATUS_WINDOW`] bytes of `source` and returns their
/// last token.
///
/// A source shorter than the window is read from its start.
///
/// # Errors
///
/// Returns any seek or read error from `source`.
pub fn trailing_token<R: Read + Seek>(source: &mut R) -> io::Result<Option<String>> {
    let end = source.seek(SeekFrom::End(0))?;
    let start = end.saturating_sub(STATUS_WINDOW as u64);
    let _ = source.seek(SeekFrom::Start(start))?;

    let mut window = [0u8; STATUS_WINDOW];
    let filled = fill_window(source, &mut window)?;
    Ok(last_token(&window[..filled]).map(|t| String::from_utf8_lossy(t).into_owned()))
}

fn fill_window<R: Read>(source: &mut R, window: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < window.len() {
        match source.read(&mut window[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Returns the last run of non-whitespace bytes in `buf`.
#[must_use]
pub fn last_token(buf: &[u8]) -> Option<&[u8]> {
    let end = buf.iter().rposition(|b| !b.is_ascii_whitespace())? + 1;
    let start = buf[..end]
        .iter()
        .rposition(u8::is_ascii_whitespace)
        .map_or(0, |i| i + 1);
    Some(&buf[start..end])
}

/// Returns whether `path` looks like a procfs root.
#[must_use]
pub fn is_procfs_mounted(path: &Path) -> bool {
    path.join("curproc").exists()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn last_token_skips_trailing_whitespace() {
        assert_eq!(last_token(b"sh 12 1 web1 \n\n"), Some(&b"web1"[..]));
        assert_eq!(last_token(b"single"), Some(&b"single"[..]));
    }

    #[test]
    fn whitespace_only_has_no_token() {
        assert_eq!(last_token(b"   \n\t "), None);
        assert_eq!(last_token(b""), None);
    }

    #[test]
    fn short_source_is_read_from_start() {
        let mut src = Cursor::new(b"cron 88 1 88 88 - ctty 0,0 web1\n".to_vec());
        assert_eq!(trailing_token(&mut src).unwrap().as_deref(), Some("web1"));
    }

    #[test]
    fn long_source_reads_only_the_trailing_window() {
        let mut content = "x".repeat(STATUS_WINDOW * 3);
        content.push_str(" db7\n");
        let mut src = Cursor::new(content.into_bytes());
        assert_eq!(trailing_token(&mut src).unwrap().as_deref(), Some("db7"));
    }

    #[test]
    fn token_cut_by_window_start_is_truncated() {
        let mut content = "a".repeat(STATUS_WINDOW + 10);
        content.push('\n');
        let mut src = Cursor::new(content.into_bytes());
        let token = trailing_token(&mut src).unwrap().unwrap();
        assert_eq!(token.len(), STATUS_WINDOW - 1);
    }

    #[test]
    fn whitespace_only_source_resolves_to_none() {
        let mut src = Cursor::new(b"  \n \n".to_vec());
        assert_eq!(trailing_token(&mut src).unwrap(), None);
    }

    #[test]
    fn resolve_reads_status_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("55")).unwrap();
        std::fs::write(dir.path().join("55/status"), "httpd 55 1 55 55 - 0 0 0 wait 80 80 80 web1\n")
            .unwrap();
        std::fs::create_dir_all(dir.path().join("56")).unwrap();
        std::fs::write(dir.path().join("56/status"), "\n  \n").unwrap();

        let resolver = MembershipResolver::new(dir.path());
        assert_eq!(resolver.resolve(55).as_deref(), Some("web1"));
        assert_eq!(resolver.resolve(56), None);
        assert_eq!(resolver.resolve(57), None);
    }

    #[test]
    fn procfs_detection_looks_for_curproc() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_procfs_mounted(dir.path()));
        std::fs::create_dir_all(dir.path().join("curproc")).unwrap();
        assert!(is_procfs_mounted(dir.path()));
    }
}
