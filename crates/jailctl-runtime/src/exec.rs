//! Running commands inside a jail.
//!
//! Commands get a scrubbed environment and have their merged output fanned
//! out to any number of sinks. rc scripts that start daemons in the
//! background keep the output pipe open after they exit, so reading stops
//! at end-of-stream or at the command's exit, whichever comes first.

use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsFd;
use std::os::unix::fs::MetadataExt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

use jailctl_common::config::ShutdownConfig;
use jailctl_common::constants::{CONSOLE_PATH, OUTPUT_POLL_MS, PASSTHROUGH_ENV, STANDARD_PATH};
use jailctl_common::error::{JailError, Result};
use jailctl_core::signal;
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

/// Where a command's output is duplicated to.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputPolicy {
    /// Append to the system console, if it can be opened.
    pub console: bool,
    /// Copy to our stdout.
    pub stdout: bool,
    /// Copy to our stderr.
    pub stderr: bool,
    /// Let the command write to our stdio directly.
    pub inherit: bool,
}

impl OutputPolicy {
    /// Output policy for the rc scripts run while stopping a jail.
    #[must_use]
    pub const fn for_scripts(verbose: bool) -> Self {
        Self {
            console: true,
            stdout: false,
            stderr: verbose,
            inherit: false,
        }
    }

    /// Output goes straight to our own stdio.
    #[must_use]
    pub const fn inherited() -> Self {
        Self {
            console: false,
            stdout: false,
            stderr: false,
            inherit: true,
        }
    }

    const fn is_silent(self) -> bool {
        !(self.console || self.stdout || self.stderr || self.inherit)
    }

    fn open_sinks(self) -> Vec<Box<dyn Write>> {
        let mut sinks: Vec<Box<dyn Write>> = Vec::new();
        if self.stdout {
            sinks.push(Box::new(io::stdout()));
        }
        if self.stderr {
            sinks.push(Box::new(io::stderr()));
        }
        if self.console {
            match OpenOptions::new().append(true).open(CONSOLE_PATH) {
                Ok(console) => sinks.push(Box::new(console)),
                Err(e) => tracing::debug!(error = %e, "console unavailable"),
            }
        }
        sinks
    }
}

/// Checks that `path` may be run inside a jail.
///
/// The file must exist, be a regular file, and be owned by `trusted_uid`.
///
/// # Errors
///
/// Returns [`JailError::ExecValidation`] when the file is missing or not
/// trusted, and [`JailError::Io`] when it cannot be examined for any other
/// reason.
pub fn validate_executable(path: &Path, trusted_uid: u32) -> Result<()> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if is_missing(&e) => {
            return Err(JailError::ExecValidation {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
        }
        Err(e) => {
            return Err(JailError::Io {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };
    if !meta.is_file() {
        return Err(JailError::ExecValidation {
            path: path.to_path_buf(),
            reason: "not a regular file".into(),
        });
    }
    if meta.uid() != trusted_uid {
        return Err(JailError::ExecValidation {
            path: path.to_path_buf(),
            reason: format!("not owned by uid {trusted_uid}"),
        });
    }
    Ok(())
}

fn is_missing(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
    ) || matches!(
        e.raw_os_error(),
        Some(libc::ELOOP | libc::ENAMETOOLONG | libc::ENOTDIR)
    )
}

/// The environment commands run with inside a jail.
#[must_use]
pub fn jail_environment() -> Vec<(String, String)> {
    let mut env = vec![("PATH".to_string(), STANDARD_PATH.to_string())];
    env.extend(
        PASSTHROUGH_ENV
            .iter()
            .filter_map(|&name| std::env::var(name).ok().map(|v| (name.to_string(), v))),
    );
    env
}

/// Runs `program` and waits for it, duplicating output per `policy`.
///
/// # Errors
///
/// Returns [`JailError::Exec`] if the command cannot be spawned, its
/// output cannot be read, or it cannot be waited on.
pub fn spawn_and_wait<S: AsRef<OsStr>>(
    program: &Path,
    args: &[S],
    env: &[(String, String)],
    policy: OutputPolicy,
) -> Result<ExitStatus> {
    let mut cmd = command(program, args, env);
    if policy.inherit {
        return cmd.status().map_err(|e| exec_error(program, e));
    }
    if policy.is_silent() {
        let _ = cmd.stdout(Stdio::null()).stderr(Stdio::null());
        return cmd.status().map_err(|e| exec_error(program, e));
    }
    let mut sinks = policy.open_sinks();
    let mut refs: Vec<&mut dyn Write> = sinks.iter_mut().map(|s| s.as_mut() as &mut dyn Write).collect();
    spawn_with_sinks(cmd, program, &mut refs)
}

/// Runs `program`, copying its merged stdout and stderr into every sink.
///
/// # Errors
///
/// Same as [`spawn_and_wait`].
pub fn run_multiplexed<S: AsRef<OsStr>>(
    program: &Path,
    args: &[S],
    env: &[(String, String)],
    sinks: &mut [&mut dyn Write],
) -> Result<ExitStatus> {
    spawn_with_sinks(command(program, args, env), program, sinks)
}

fn command<S: AsRef<OsStr>>(program: &Path, args: &[S], env: &[(String, String)]) -> Command {
    let mut cmd = Command::new(program);
    let _ = cmd
        .args(args)
        .env_clear()
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null());
    // SAFETY: restoring signal dispositions only calls sigaction(2), which
    // is async-signal-safe, and touches no state shared with the parent.
    unsafe {
        let _ = cmd.pre_exec(|| {
            signal::restore_job_signals().map_err(|e| io::Error::other(e.to_string()))
        });
    }
    cmd
}

fn spawn_with_sinks(mut cmd: Command, program: &Path, sinks: &mut [&mut dyn Write]) -> Result<ExitStatus> {
    let (read_end, write_end) = nix::unistd::pipe().map_err(|e| exec_error(program, e.into()))?;
    let write_err = write_end.try_clone().map_err(|e| exec_error(program, e))?;
    let _ = cmd
        .stdout(Stdio::from(write_end))
        .stderr(Stdio::from(write_err));

    let mut child = cmd.spawn().map_err(|e| exec_error(program, e))?;
    // Our copies of the write end must be closed to ever see end-of-stream.
    drop(cmd);

    let output = File::from(read_end);
    pump(&mut child, &output, sinks).map_err(|e| exec_error(program, e))?;
    child.wait().map_err(|e| exec_error(program, e))
}

/// Copies output to the sinks until end-of-stream or the child exits.
fn pump(child: &mut Child, output: &File, sinks: &mut [&mut dyn Write]) -> io::Result<()> {
    let mut reader = output;
    let mut buf = [0u8; 256];
    loop {
        if !readable(output, PollTimeout::from(OUTPUT_POLL_MS))? {
            if child.try_wait()?.is_some() {
                break;
            }
            continue;
        }
        match reader.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => fan_out(sinks, &buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
        if child.try_wait()?.is_some() {
            break;
        }
    }

    // The command is gone; take what is already buffered without waiting
    // on whoever else still holds the pipe.
    while readable(output, PollTimeout::ZERO)? {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => fan_out(sinks, &buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn readable(output: &File, timeout: PollTimeout) -> io::Result<bool> {
    let mut fds = [PollFd::new(output.as_fd(), PollFlags::POLLIN)];
    match poll(&mut fds, timeout) {
        Ok(n) => Ok(n > 0),
        Err(Errno::EINTR) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn fan_out(sinks: &mut [&mut dyn Write], bytes: &[u8]) {
    for sink in sinks.iter_mut() {
        let _ = sink.write_all(bytes);
    }
}

fn exec_error(program: &Path, source: io::Error) -> JailError {
    JailError::Exec {
        path: program.to_path_buf(),
        source,
    }
}

/// Runs rc scripts through the shell with the jail environment.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    shell: PathBuf,
    trusted_uid: u32,
    policy: OutputPolicy,
}

impl ScriptRunner {
    /// Creates a runner.
    #[must_use]
    pub const fn new(shell: PathBuf, trusted_uid: u32, policy: OutputPolicy) -> Self {
        Self {
            shell,
            trusted_uid,
            policy,
        }
    }

    /// Creates the runner used while stopping a jail.
    #[must_use]
    pub fn from_config(config: &ShutdownConfig) -> Self {
        Self::new(
            config.shell.clone(),
            config.trusted_uid,
            OutputPolicy::for_scripts(config.verbose),
        )
    }

    /// Checks that `script` may be run.
    ///
    /// # Errors
    ///
    /// See [`validate_executable`].
    pub fn check(&self, script: &Path) -> Result<()> {
        validate_executable(script, self.trusted_uid)
    }

    /// Runs `script` and reports whether it exited successfully.
    ///
    /// # Errors
    ///
    /// Returns [`JailError::Exec`] if the shell cannot be started.
    pub fn run(&self, script: &Path) -> Result<bool> {
        tracing::info!(script = %script.display(), "running script");
        let status = spawn_and_wait(&self.shell, &[script], &jail_environment(), self.policy)?;
        Ok(status.success())
    }
}
