//! System-wide constants and default paths.

/// Seconds to wait between kill passes when stopping a jail.
pub const DEFAULT_STOP_TIMEOUT_SECS: u32 = 3;

/// Script run inside the jail to shut it down in an orderly way.
pub const SHUTDOWN_SCRIPT: &str = "/etc/rc.shutdown";

/// Script run inside the jail to bring it back up.
pub const START_SCRIPT: &str = "/etc/rc";

/// Shell used to interpret the rc scripts.
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// `ps` binary run inside a jail by `jailctl ps`.
pub const PS_COMMAND: &str = "/bin/ps";

/// Owner uid an executable must have before it is run inside a jail.
pub const TRUSTED_UID: u32 = 0;

/// Command name fragment that identifies a jail's supervisor process.
pub const SUPERVISOR_COMMAND: &str = "jailer";

/// Mount point of the process filesystem.
pub const PROCFS_ROOT: &str = "/proc";

/// Size of the trailing window read from a process status file.
pub const STATUS_WINDOW: usize = 256;

/// Console device that script output is duplicated to.
pub const CONSOLE_PATH: &str = "/dev/console";

/// `PATH` given to commands run inside a jail.
pub const STANDARD_PATH: &str = "/usr/bin:/bin:/usr/sbin:/sbin";

/// Environment variables passed through to commands run inside a jail.
pub const PASSTHROUGH_ENV: &[&str] = &["TERM", "COLUMNS", "LINES"];

/// Milliseconds between output polls while a command runs.
pub const OUTPUT_POLL_MS: u8 = 10;

/// Binary name for the CLI.
pub const BIN_NAME: &str = "jailctl";
