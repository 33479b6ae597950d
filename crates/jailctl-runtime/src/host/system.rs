//! The live host: real process listings, real signals, real scripts.

use std::path::Path;
use std::time::Duration;

use jailctl_common::config::ShutdownConfig;
use jailctl_common::error::Result;
use jailctl_common::types::ProcessRecord;
use jailctl_core::membership::MembershipResolver;
use jailctl_core::process::{self, ProcessSnapshot, ProcessTable};
use jailctl_core::signal::{self, Delivery, Signal};

use super::ShutdownHost;
use crate::exec::ScriptRunner;

/// Which processes a [`SystemHost`] treats as the jail's occupants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// The caller runs inside the jail; every other visible process is an
    /// occupant.
    Attached,
    /// The caller runs on the host; occupants are the jailed processes
    /// whose membership resolves to this name.
    Named(String),
}

/// [`ShutdownHost`] backed by the running system.
pub struct SystemHost {
    table: Box<dyn ProcessTable>,
    resolver: MembershipResolver,
    scope: Scope,
    scripts: ScriptRunner,
    tick: Duration,
}

impl SystemHost {
    /// Host for a session running inside the jail it stops.
    #[must_use]
    pub fn attached(config: &ShutdownConfig) -> Self {
        Self::new(process::default_table(), MembershipResolver::procfs(), Scope::Attached)
            .with_scripts(ScriptRunner::from_config(config))
    }

    /// Host for acting on the jail named `jail` from outside it.
    #[must_use]
    pub fn named(jail: impl Into<String>, resolver: MembershipResolver) -> Self {
        Self::new(process::default_table(), resolver, Scope::Named(jail.into()))
    }

    /// Builds a host over an explicit process table.
    #[must_use]
    pub fn new(table: Box<dyn ProcessTable>, resolver: MembershipResolver, scope: Scope) -> Self {
        Self {
            table,
            resolver,
            scope,
            scripts: ScriptRunner::from_config(&ShutdownConfig::default()),
            tick: Duration::from_secs(1),
        }
    }

    /// Replaces the script runner.
    #[must_use]
    pub fn with_scripts(mut self, scripts: ScriptRunner) -> Self {
        self.scripts = scripts;
        self
    }

    /// Replaces the polling tick length.
    #[must_use]
    pub const fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }
}

impl ShutdownHost for SystemHost {
    fn occupants(&mut self) -> Result<Vec<ProcessRecord>> {
        let snapshot = ProcessSnapshot::take(self.table.as_ref())?;
        Ok(match &self.scope {
            Scope::Attached => snapshot.others().cloned().collect(),
            Scope::Named(jail) => snapshot.members_of(jail, &self.resolver),
        })
    }

    fn signal(&mut self, pid: u32, sig: Signal) -> Result<Delivery> {
        signal::send(pid, sig)
    }

    fn check_script(&self, script: &Path) -> Result<()> {
        self.scripts.check(script)
    }

    fn run_script(&mut self, script: &Path) -> Result<bool> {
        self.scripts.run(script)
    }

    fn tick(&mut self) {
        std::thread::sleep(self.tick);
    }
}
