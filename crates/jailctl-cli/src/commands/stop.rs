//! `jailctl stop`: Stop jails, escalating from scripts to signals.
//!
//! From the host every named jail is stopped by a worker attached to it.
//! Run inside a jail with no targets, the command stops that jail itself,
//! always forcing and always running the scripts.

use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{Args, CommandFactory};
use jailctl_common::config::ShutdownConfig;
use jailctl_common::constants::DEFAULT_STOP_TIMEOUT_SECS;
use jailctl_runtime::engine::Engine;

use super::Cli;

/// Arguments for the `stop` command.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Jail hostnames or numeric ids. Omitted when run inside a jail.
    pub jails: Vec<String>,

    /// Kill processes that survive both terminate passes.
    #[arg(short, long)]
    pub force: bool,

    /// Run the start script once the jail is stopped.
    #[arg(short, long)]
    pub restart: bool,

    /// Skip the shutdown script and go straight to signals.
    #[arg(short = 'k', long, conflicts_with = "restart")]
    pub no_scripts: bool,

    /// Seconds to wait after each signal pass.
    #[arg(
        short,
        long,
        env = "JAILCTL_TIMEOUT",
        default_value_t = DEFAULT_STOP_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub timeout: u32,
}

impl StopArgs {
    /// Builds the shutdown configuration these flags describe.
    #[must_use]
    pub fn config(&self, quiet: bool, verbose: bool) -> ShutdownConfig {
        ShutdownConfig {
            timeout_secs: self.timeout,
            quiet,
            verbose,
            force: self.force,
            restart: self.restart,
            use_scripts: !self.no_scripts,
            ..ShutdownConfig::default()
        }
    }

    /// Configuration for stopping the jail the command runs in. Only the
    /// restart and timeout flags apply there.
    #[must_use]
    pub fn jailed_config(&self, quiet: bool) -> ShutdownConfig {
        ShutdownConfig {
            timeout_secs: self.timeout,
            quiet,
            verbose: true,
            force: true,
            restart: self.restart,
            use_scripts: true,
            ..ShutdownConfig::default()
        }
    }

    /// Flags that have no effect inside a jail.
    fn ignored_in_jail(&self) -> Vec<&'static str> {
        let mut ignored = Vec::new();
        if self.force {
            ignored.push("-f");
        }
        if self.no_scripts {
            ignored.push("-k");
        }
        ignored
    }
}

/// Executes the `stop` command.
///
/// # Errors
///
/// Returns an error if the jail list cannot be read or a fatal error
/// aborts the run; jails that fail to stop only affect the exit status.
pub fn execute(args: &StopArgs, quiet: bool, verbose: bool) -> anyhow::Result<ExitCode> {
    if jailctl_core::context::running_in_jail()? {
        return stop_current(args, quiet);
    }
    if args.jails.is_empty() {
        Cli::command()
            .error(ErrorKind::MissingRequiredArgument, "stop needs at least one jail when run from the host")
            .exit();
    }
    let config = args.config(quiet, verbose);
    let summary = Engine::new().stop(&args.jails, &config)?;
    Ok(super::summary_status(&summary))
}

fn stop_current(args: &StopArgs, quiet: bool) -> anyhow::Result<ExitCode> {
    if !args.jails.is_empty() {
        Cli::command()
            .error(ErrorKind::ArgumentConflict, "jails can't be named from inside a jail")
            .exit();
    }
    for flag in args.ignored_in_jail() {
        if !quiet {
            tracing::warn!("the '{flag}' option is not supported from inside a jail");
        }
    }
    let report = Engine::stop_current(&args.jailed_config(quiet))?;
    Ok(if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::commands::{Cli, Command};

    fn parse(argv: &[&str]) -> Result<StopArgs, clap::Error> {
        let cli = Cli::try_parse_from(argv)?;
        match cli.command {
            Command::Stop(args) => Ok(args),
            other => panic!("expected stop, got {other:?}"),
        }
    }

    #[test]
    fn flags_map_onto_config() {
        let args = parse(&["jailctl", "stop", "-f", "-r", "-t", "7", "web1", "db1"]).unwrap();
        let cfg = args.config(false, true);
        assert_eq!(args.jails, ["web1", "db1"]);
        assert_eq!(cfg.timeout_secs, 7);
        assert!(cfg.force && cfg.restart && cfg.verbose && cfg.use_scripts);
    }

    #[test]
    fn no_scripts_conflicts_with_restart() {
        let err = parse(&["jailctl", "stop", "-k", "-r", "web1"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn zero_timeout_is_a_usage_error() {
        let err = parse(&["jailctl", "stop", "-t", "0", "web1"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn targets_may_be_omitted_for_the_current_jail() {
        let args = parse(&["jailctl", "stop", "-r", "-t", "5"]).unwrap();
        assert!(args.jails.is_empty());
    }

    #[test]
    fn current_jail_is_always_forced_with_scripts() {
        let args = parse(&["jailctl", "stop", "-k", "-t", "5"]).unwrap();
        let cfg = args.jailed_config(false);
        assert!(cfg.force && cfg.use_scripts && cfg.verbose);
        assert!(!cfg.restart);
        assert_eq!(cfg.timeout_secs, 5);
        assert_eq!(args.ignored_in_jail(), ["-k"]);

        let args = parse(&["jailctl", "stop", "-r"]).unwrap();
        assert!(args.jailed_config(true).restart);
        assert!(args.ignored_in_jail().is_empty());
    }

    #[test]
    fn default_timeout_applies() {
        let args = parse(&["jailctl", "stop", "-k", "web1"]).unwrap();
        assert!(!args.config(true, false).use_scripts);
        if std::env::var_os("JAILCTL_TIMEOUT").is_none() {
            assert_eq!(args.timeout, DEFAULT_STOP_TIMEOUT_SECS);
        }
    }
}
