//! Point-in-time process listings.
//!
//! A [`ProcessSnapshot`] is one best-effort view of the host's processes.
//! Nothing is locked while it is taken, so any process in it may already
//! be gone by the time the caller acts on it.

use std::fs;
use std::path::PathBuf;

use jailctl_common::error::{JailError, Result};
use jailctl_common::types::ProcessRecord;

use crate::membership::{self, MembershipResolver};

/// Token a procfs status file uses in place of a jail name.
const NOT_JAILED: &str = "-";

/// A provider of full host process listings.
pub trait ProcessTable {
    /// Lists every process currently known to the kernel.
    ///
    /// # Errors
    ///
    /// Returns [`JailError::KernelQuery`] if the listing cannot complete.
    fn list(&self) -> Result<Vec<ProcessRecord>>;
}

/// One listing of host processes, taken at a single instant.
#[derive(Debug, Clone)]
pub struct ProcessSnapshot {
    records: Vec<ProcessRecord>,
    own_pid: u32,
}

impl ProcessSnapshot {
    /// Lists the processes of `table` now.
    ///
    /// # Errors
    ///
    /// Propagates the table's [`JailError::KernelQuery`].
    pub fn take(table: &dyn ProcessTable) -> Result<Self> {
        Ok(Self::from_records(table.list()?, std::process::id()))
    }

    /// Builds a snapshot from records listed on behalf of `own_pid`.
    #[must_use]
    pub const fn from_records(records: Vec<ProcessRecord>, own_pid: u32) -> Self {
        Self { records, own_pid }
    }

    /// All processes in the snapshot, in kernel order.
    #[must_use]
    pub fn list(&self) -> &[ProcessRecord] {
        &self.records
    }

    /// Processes other than the one that took the snapshot.
    pub fn others(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.records.iter().filter(move |p| p.pid != self.own_pid)
    }

    /// Whether anything besides the calling process is running.
    #[must_use]
    pub fn is_populated(&self) -> bool {
        self.others().next().is_some()
    }

    /// Processes that belong to the jail named `jail`.
    ///
    /// Only processes flagged as jailed are resolved. A process whose
    /// status cannot be read is left out, which can undercount a jail whose
    /// processes are exiting while the snapshot is examined.
    #[must_use]
    pub fn members_of(&self, jail: &str, resolver: &MembershipResolver) -> Vec<ProcessRecord> {
        self.others()
            .filter(|p| p.jailed)
            .filter_map(|p| {
                let name = resolver.resolve(p.pid)?;
                (name == jail).then(|| ProcessRecord {
                    jail: Some(name),
                    ..p.clone()
                })
            })
            .collect()
    }
}

/// Process table read from a procfs mount.
///
/// Each `<root>/<pid>/status` file is a single line whose first token is
/// the command name and whose last token is the jail name, or `-`.
#[derive(Debug, Clone)]
pub struct ProcfsProcessTable {
    root: PathBuf,
}

impl ProcfsProcessTable {
    /// Reads processes below `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_status(&self, pid: u32) -> Option<ProcessRecord> {
        let content = fs::read(self.root.join(pid.to_string()).join("status")).ok()?;
        let command = content
            .split(u8::is_ascii_whitespace)
            .find(|t| !t.is_empty())
            .map(|t| String::from_utf8_lossy(t).into_owned())?;
        let jailed = membership::last_token(&content).is_some_and(|t| t != NOT_JAILED.as_bytes());
        Some(ProcessRecord {
            pid,
            jailed,
            command,
            jail: None,
        })
    }
}

impl ProcessTable for ProcfsProcessTable {
    fn list(&self) -> Result<Vec<ProcessRecord>> {
        let entries = fs::read_dir(&self.root).map_err(|e| JailError::KernelQuery {
            message: format!("couldn't list processes in {}: {e}", self.root.display()),
        })?;

        let mut pids: Vec<u32> = entries
            .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse().ok())
            .collect();
        pids.sort_unstable();

        // A process can exit between the directory read and its status read.
        Ok(pids.into_iter().filter_map(|pid| self.read_status(pid)).collect())
    }
}

/// Process table read through the `kern.proc` sysctl.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelProcessTable;

#[cfg(target_os = "freebsd")]
impl ProcessTable for KernelProcessTable {
    fn list(&self) -> Result<Vec<ProcessRecord>> {
        use std::mem::size_of;

        use crate::sysctl::{self, Oid};

        // `P_JAILED` from <sys/proc.h>.
        const P_JAILED: libc::c_long = 0x0100_0000;

        let mib = [libc::CTL_KERN, libc::KERN_PROC, libc::KERN_PROC_PROC, 0];
        let data = sysctl::read_growing(Oid::Mib(&mib)).map_err(|e| JailError::KernelQuery {
            message: format!("couldn't list processes: {e}"),
        })?;

        let stride = size_of::<libc::kinfo_proc>();
        let mut records = Vec::with_capacity(data.len() / stride);
        for chunk in data.chunks_exact(stride) {
            // SAFETY: `chunk` holds exactly `size_of::<kinfo_proc>()` bytes
            // written by the kernel; `read_unaligned` tolerates the Vec's
            // alignment and every bit pattern is a valid `kinfo_proc`.
            let kp: libc::kinfo_proc = unsafe { chunk.as_ptr().cast::<libc::kinfo_proc>().read_unaligned() };
            if usize::try_from(kp.ki_structsize).ok() != Some(stride) {
                return Err(JailError::VersionSkew {
                    message: format!(
                        "kinfo_proc is {} bytes, this build expects {stride}",
                        kp.ki_structsize
                    ),
                });
            }
            let comm: Vec<u8> = kp
                .ki_comm
                .iter()
                .take_while(|&&c| c != 0)
                .map(|&c| c as u8)
                .collect();
            records.push(ProcessRecord {
                pid: u32::try_from(kp.ki_pid).unwrap_or_default(),
                jailed: kp.ki_flag & P_JAILED != 0,
                command: String::from_utf8_lossy(&comm).into_owned(),
                jail: None,
            });
        }
        Ok(records)
    }
}

/// Stub for platforms without the `kern.proc` sysctl.
#[cfg(not(target_os = "freebsd"))]
impl ProcessTable for KernelProcessTable {
    fn list(&self) -> Result<Vec<ProcessRecord>> {
        Err(JailError::KernelQuery {
            message: "kernel process listing requires FreeBSD".into(),
        })
    }
}

/// Picks the process table for the current platform.
#[must_use]
pub fn default_table() -> Box<dyn ProcessTable> {
    #[cfg(target_os = "freebsd")]
    {
        Box::new(KernelProcessTable)
    }
    #[cfg(not(target_os = "freebsd"))]
    {
        Box::new(ProcfsProcessTable::new(jailctl_common::constants::PROCFS_ROOT))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;

    fn add_process(root: &Path, pid: u32, line: &str) {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("status"), line).unwrap();
    }

    fn status(comm: &str, pid: u32, jail: &str) -> String {
        format!("{comm} {pid} 1 {pid} {pid} - noflags 1700000000,0 0,0 0,0 select 0 0 0,0 {jail}\n")
    }

    fn record(pid: u32, jailed: bool) -> ProcessRecord {
        ProcessRecord {
            pid,
            jailed,
            command: format!("p{pid}"),
            jail: None,
        }
    }

    #[test]
    fn procfs_table_reads_command_and_jail_flag() {
        let dir = tempfile::tempdir().unwrap();
        add_process(dir.path(), 100, &status("nginx", 100, "web1"));
        add_process(dir.path(), 7, &status("init", 7, "-"));
        fs::create_dir_all(dir.path().join("curproc")).unwrap();

        let records = ProcfsProcessTable::new(dir.path()).list().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].pid, 7);
        assert!(!records[0].jailed);
        assert_eq!(records[1].command, "nginx");
        assert!(records[1].jailed);
    }

    #[test]
    fn procfs_table_skips_unreadable_processes() {
        let dir = tempfile::tempdir().unwrap();
        add_process(dir.path(), 100, &status("sh", 100, "web1"));
        fs::create_dir_all(dir.path().join("101")).unwrap();
        let records = ProcfsProcessTable::new(dir.path()).list().unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn missing_procfs_is_a_kernel_query_error() {
        let table = ProcfsProcessTable::new("/nonexistent/proc");
        assert!(matches!(table.list(), Err(JailError::KernelQuery { .. })));
    }

    #[test]
    fn snapshot_excludes_own_pid_from_population() {
        let snap = ProcessSnapshot::from_records(vec![record(42, true)], 42);
        assert!(!snap.is_populated());
        assert_eq!(snap.list().len(), 1);

        let snap = ProcessSnapshot::from_records(vec![record(42, true), record(43, true)], 42);
        assert!(snap.is_populated());
        assert_eq!(snap.others().map(|p| p.pid).collect::<Vec<_>>(), [43]);
    }

    #[test]
    fn members_of_filters_by_resolved_jail() {
        let dir = tempfile::tempdir().unwrap();
        add_process(dir.path(), 100, &status("nginx", 100, "web1"));
        add_process(dir.path(), 101, &status("sh", 101, "db1"));
        add_process(dir.path(), 102, &status("cron", 102, "web1"));
        add_process(dir.path(), 1, &status("init", 1, "-"));

        let table = ProcfsProcessTable::new(dir.path());
        let snap = ProcessSnapshot::from_records(table.list().unwrap(), 102);
        let resolver = MembershipResolver::new(dir.path());
        let members = snap.members_of("web1", &resolver);
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].pid, 100);
        assert_eq!(members[0].jail.as_deref(), Some("web1"));
    }
}
