//! Runtime engine driving jail operations across several targets.

use std::io::Write;
use std::path::Path;

use jailctl_common::config::{ShutdownConfig, SignalConfig};
use jailctl_common::constants::{PROCFS_ROOT, PS_COMMAND, TRUSTED_UID};
use jailctl_common::error::{JailError, Result};
use jailctl_common::types::Container;
use jailctl_core::context;
use jailctl_core::membership::{self, MembershipResolver};
use jailctl_core::process::{self, ProcessSnapshot};
use jailctl_core::registry::{JailRegistry, RecordSource, SysctlJailList};
use jailctl_core::signal::{self, Signal};

use crate::exec::{self, OutputPolicy};
use crate::host::SystemHost;
use crate::shutdown::{ShutdownOrchestrator, ShutdownReport};
use crate::supervisor;
use crate::worker::{self, WORKER_FAILED, WORKER_FATAL};

/// Tally of a multi-target operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    /// Targets the operation succeeded on.
    pub succeeded: Vec<String>,
    /// Targets it failed on, unknown ones included.
    pub failed: Vec<String>,
}

impl Summary {
    /// Whether every target succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Coordinates registry lookups, workers and shutdown sessions.
pub struct Engine {
    source: Box<dyn RecordSource>,
}

impl Engine {
    /// Creates an engine reading the kernel's jail list.
    #[must_use]
    pub fn new() -> Self {
        Self::with_source(Box::new(SysctlJailList))
    }

    /// Creates an engine over a custom record source.
    #[must_use]
    pub fn with_source(source: Box<dyn RecordSource>) -> Self {
        Self { source }
    }

    /// Lists every live jail.
    ///
    /// # Errors
    ///
    /// Returns [`JailError::KernelQuery`] or [`JailError::VersionSkew`] if
    /// the registry cannot be read.
    pub fn list(&self) -> Result<Vec<Container>> {
        let registry = JailRegistry::load(self.source.as_ref())?;
        let containers = registry.iter().collect::<Result<Vec<_>>>();
        registry.release();
        containers
    }

    /// Resolves `key` against a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns [`JailError::UnknownContainer`] when nothing matches, or any
    /// registry error.
    pub fn resolve(&self, key: &str) -> Result<Container> {
        let registry = JailRegistry::load(self.source.as_ref())?;
        let found = registry.find(key);
        registry.release();
        found?.ok_or_else(|| JailError::UnknownContainer { key: key.into() })
    }

    /// Stops every target in turn, each from a worker attached to it.
    ///
    /// Targets that cannot be resolved or stopped are recorded as failed
    /// and the remaining targets are still processed.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid configuration, for fatal registry
    /// errors, and [`JailError::WorkerAborted`] when a worker could not
    /// attach or hit a fatal error inside the jail. All of these abort the
    /// whole run.
    pub fn stop<S: AsRef<str>>(&self, targets: &[S], config: &ShutdownConfig) -> Result<Summary> {
        config.validate()?;
        self.for_each_target(targets, config.quiet, |container| {
            let name = container.hostname.clone();
            let code = scoped(
                &container.hostname,
                || {
                    context::enter_container_context(container.id)?;
                    signal::ignore_job_signals()
                },
                || stop_attached(&name, config),
            )?;
            Ok(code == 0)
        })
    }

    /// Stops the jail the caller is running in, from inside it.
    ///
    /// No registry lookup or attach happens: every other process visible
    /// to the caller belongs to the jail.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid configuration, if job-control
    /// signals cannot be ignored, or any error of the shutdown session.
    pub fn stop_current(config: &ShutdownConfig) -> Result<ShutdownReport> {
        config.validate()?;
        signal::ignore_job_signals()?;
        let name = nix::unistd::gethostname()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".into());
        let mut host = SystemHost::attached(config);
        ShutdownOrchestrator::new(&mut host, config).shutdown(&name)
    }

    /// Sends `sig` to the supervisor of every target.
    ///
    /// Membership is resolved from the host through procfs, which must be
    /// mounted.
    ///
    /// # Errors
    ///
    /// Returns [`JailError::KernelQuery`] if procfs is not mounted, and
    /// fatal registry errors.
    pub fn signal<S: AsRef<str>>(&self, targets: &[S], sig: Signal, config: &SignalConfig) -> Result<Summary> {
        if !membership::is_procfs_mounted(Path::new(PROCFS_ROOT)) {
            return Err(JailError::KernelQuery {
                message: format!("procfs not mounted on {PROCFS_ROOT}"),
            });
        }
        self.for_each_target(targets, config.quiet, |container| {
            let mut host = SystemHost::named(container.hostname.clone(), MembershipResolver::procfs());
            match supervisor::signal_supervisor(&mut host, &container.hostname, sig, config) {
                Ok(_) => Ok(true),
                Err(JailError::SupervisorNotRunning { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        })
    }

    /// Prints the pids of the processes in `key` on one line.
    ///
    /// # Errors
    ///
    /// Returns an error if the jail is unknown or the worker fails.
    pub fn pids(&self, key: &str) -> Result<i32> {
        let container = self.resolve(key)?;
        scoped(
            &container.hostname,
            || context::enter_container_context(container.id),
            || match ProcessSnapshot::take(process::default_table().as_ref()) {
                Ok(snapshot) => {
                    let pids: Vec<String> = snapshot.others().map(|p| p.pid.to_string()).collect();
                    let mut out = std::io::stdout().lock();
                    let _ = writeln!(out, "{}", pids.join(" "));
                    0
                }
                Err(e) => {
                    tracing::error!(error = %e, "couldn't list processes");
                    if e.is_fatal() { WORKER_FATAL } else { WORKER_FAILED }
                }
            },
        )
    }

    /// Runs `ps` inside `key` with extra arguments, on the caller's stdio.
    ///
    /// # Errors
    ///
    /// Returns an error if the jail is unknown or the worker fails.
    pub fn ps<S: AsRef<str>>(&self, key: &str, args: &[S]) -> Result<i32> {
        let container = self.resolve(key)?;
        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        scoped(
            &container.hostname,
            || context::enter_container_context(container.id),
            || run_ps(&args),
        )
    }

    fn for_each_target<S, F>(&self, targets: &[S], quiet: bool, mut op: F) -> Result<Summary>
    where
        S: AsRef<str>,
        F: FnMut(&Container) -> Result<bool>,
    {
        let mut summary = Summary::default();
        for target in targets {
            let key = target.as_ref();
            let outcome = self.resolve(key).and_then(|container| op(&container));
            match outcome {
                Ok(true) => summary.succeeded.push(key.to_string()),
                Ok(false) => summary.failed.push(key.to_string()),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    if !quiet {
                        tracing::warn!(jail = key, "{e}");
                    }
                    summary.failed.push(key.to_string());
                }
            }
        }
        Ok(summary)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a worker for `jail`, turning a fatal worker status into an error.
fn scoped<H, B>(jail: &str, hook: H, body: B) -> Result<i32>
where
    H: FnOnce() -> Result<()>,
    B: FnOnce() -> i32,
{
    match worker::run_scoped(hook, body)? {
        WORKER_FATAL => Err(JailError::WorkerAborted { jail: jail.into() }),
        code => Ok(code),
    }
}

/// Body of a stop worker, already attached to the jail.
fn stop_attached(jail: &str, config: &ShutdownConfig) -> i32 {
    let mut host = SystemHost::attached(config);
    match ShutdownOrchestrator::new(&mut host, config).shutdown(jail) {
        Ok(report) if report.succeeded() => 0,
        Ok(_) => WORKER_FAILED,
        Err(e) => {
            tracing::error!(jail, error = %e, "shutdown aborted");
            if e.is_fatal() { WORKER_FATAL } else { WORKER_FAILED }
        }
    }
}

fn run_ps(args: &[&str]) -> i32 {
    let ps = Path::new(PS_COMMAND);
    if let Err(e) = exec::validate_executable(ps, TRUSTED_UID) {
        tracing::error!("can't execute in jail: {e}");
        return WORKER_FAILED;
    }
    match exec::spawn_and_wait(ps, args, &exec::jail_environment(), OutputPolicy::inherited()) {
        Ok(status) => status.code().unwrap_or(WORKER_FAILED),
        Err(e) => {
            tracing::error!(error = %e, "ps failed");
            WORKER_FAILED
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::net::Ipv4Addr;
    use std::rc::Rc;

    use jailctl_core::registry::Fetch;

    use super::*;

    /// Fixed stream of version 3 records.
    struct Stream(Vec<u8>);

    impl RecordSource for Stream {
        fn required_len(&self) -> Result<usize> {
            Ok(self.0.len())
        }

        fn fetch(&self, buf: &mut [u8]) -> Result<Fetch> {
            buf.copy_from_slice(&self.0);
            Ok(Fetch::Filled(self.0.len()))
        }
    }

    fn field(out: &mut Vec<u8>, s: &str, len: usize) {
        let mut bytes = vec![0u8; len];
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        out.extend_from_slice(&bytes);
    }

    fn v3(id: i32, host: &str, ip: Ipv4Addr) -> Vec<u8> {
        let mut out = Vec::new();
        for word in [3, id, 0, 0] {
            out.extend_from_slice(&word.to_ne_bytes());
        }
        field(&mut out, &format!("/jails/{host}"), 1024);
        field(&mut out, host, 256);
        field(&mut out, host, 256);
        out.extend_from_slice(&1u32.to_ne_bytes());
        out.extend_from_slice(&0u32.to_ne_bytes());
        out.extend_from_slice(&ip.octets());
        out
    }

    /// Counts registry loads, one per resolved target.
    struct Counted {
        stream: Stream,
        loads: Rc<Cell<usize>>,
    }

    impl RecordSource for Counted {
        fn required_len(&self) -> Result<usize> {
            self.loads.set(self.loads.get() + 1);
            self.stream.required_len()
        }

        fn fetch(&self, buf: &mut [u8]) -> Result<Fetch> {
            self.stream.fetch(buf)
        }
    }

    fn two_jails() -> Stream {
        let mut data = v3(1, "web1", Ipv4Addr::new(10, 0, 0, 1));
        data.extend(v3(2, "db1", Ipv4Addr::new(10, 0, 0, 2)));
        Stream(data)
    }

    fn engine() -> Engine {
        Engine::with_source(Box::new(two_jails()))
    }

    #[test]
    fn list_returns_every_jail() {
        let names: Vec<String> = engine().list().unwrap().into_iter().map(|c| c.hostname).collect();
        assert_eq!(names, ["web1", "db1"]);
    }

    #[test]
    fn resolve_by_name_and_id() {
        let engine = engine();
        assert_eq!(engine.resolve("db1").unwrap().id.get(), 2);
        assert_eq!(engine.resolve("1").unwrap().hostname, "web1");
        assert!(matches!(engine.resolve("mail"), Err(JailError::UnknownContainer { .. })));
    }

    #[test]
    fn unknown_targets_do_not_stop_the_loop() {
        let engine = engine();
        let summary = engine
            .for_each_target(&["nope", "web1", "-3"], true, |c| Ok(c.hostname == "web1"))
            .unwrap();
        assert_eq!(summary.succeeded, ["web1"]);
        assert_eq!(summary.failed, ["nope", "-3"]);
        assert!(!summary.all_succeeded());
    }

    #[test]
    fn fatal_errors_abort_the_loop() {
        let engine = engine();
        let result = engine.for_each_target(&["web1", "db1"], true, |_| {
            Err(JailError::VersionSkew {
                message: "test".into(),
            })
        });
        assert!(matches!(result, Err(JailError::VersionSkew { .. })));
    }

    #[test]
    fn invalid_config_is_rejected_before_any_target() {
        let config = ShutdownConfig {
            timeout_secs: 0,
            ..ShutdownConfig::default()
        };
        assert!(matches!(engine().stop(&["web1"], &config), Err(JailError::Config { .. })));
        assert!(matches!(Engine::stop_current(&config), Err(JailError::Config { .. })));
    }

    #[test]
    fn fatal_worker_status_becomes_an_error() {
        let result = scoped("web1", || Ok(()), || WORKER_FATAL);
        assert!(matches!(result, Err(JailError::WorkerAborted { ref jail }) if jail == "web1"));
        assert_eq!(scoped("web1", || Ok(()), || WORKER_FAILED).unwrap(), WORKER_FAILED);
    }

    #[cfg(not(target_os = "freebsd"))]
    #[test]
    fn refused_attach_aborts_before_the_next_target() {
        let loads = Rc::new(Cell::new(0));
        let engine = Engine::with_source(Box::new(Counted {
            stream: two_jails(),
            loads: Rc::clone(&loads),
        }));

        let result = engine.stop(&["web1", "db1"], &ShutdownConfig::default());

        assert!(matches!(result, Err(JailError::WorkerAborted { ref jail }) if jail == "web1"));
        assert_eq!(loads.get(), 1);
    }
}
