//! CLI command definitions and dispatch.

pub mod list;
pub mod ps;
pub mod signal;
pub mod stop;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use jailctl_common::constants::BIN_NAME;
use jailctl_runtime::engine::Summary;

/// jailctl: stop, signal and inspect FreeBSD jails.
#[derive(Parser, Debug)]
#[command(name = "jailctl", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Suppress warnings.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Report progress and copy script output to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Log filter used when `RUST_LOG` is not set.
    #[must_use]
    pub const fn log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else if self.verbose {
            "info"
        } else {
            "warn"
        }
    }
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the live jails.
    List(list::ListArgs),
    /// Show the processes of a jail.
    Ps(ps::PsArgs),
    /// Stop jails, escalating from scripts to signals.
    Stop(stop::StopArgs),
    /// Send one signal to the supervisor of each jail.
    Signal(signal::SignalArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command cannot run at all. Per-jail failures
/// are reported through the exit code instead.
pub fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    let (quiet, verbose) = (cli.quiet, cli.verbose);
    match cli.command {
        Command::List(args) => list::execute(&args),
        Command::Ps(args) => ps::execute(&args),
        Command::Stop(args) => stop::execute(&args, quiet, verbose),
        Command::Signal(args) => signal::execute(&args, quiet),
    }
}

/// Refuses commands that only make sense on the host.
fn require_host(command: &str) -> anyhow::Result<()> {
    if jailctl_core::context::running_in_jail()? {
        anyhow::bail!("{BIN_NAME} {command}: must be run from the host, not inside a jail");
    }
    Ok(())
}

/// Exit status for a multi-target run.
fn summary_status(summary: &Summary) -> ExitCode {
    if summary.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        tracing::info!(failed = ?summary.failed, "some jails failed");
        ExitCode::FAILURE
    }
}

/// Exit status mirroring a worker's status.
fn worker_status(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn quiet_and_verbose_pick_log_level() {
        let cli = Cli::try_parse_from(["jailctl", "-q", "list"]).unwrap();
        assert_eq!(cli.log_level(), "error");
        let cli = Cli::try_parse_from(["jailctl", "list", "--verbose"]).unwrap();
        assert_eq!(cli.log_level(), "info");
        let cli = Cli::try_parse_from(["jailctl", "list"]).unwrap();
        assert_eq!(cli.log_level(), "warn");
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        let err = Cli::try_parse_from(["jailctl", "-q", "-v", "list"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn summary_maps_to_exit_status() {
        let ok = Summary {
            succeeded: vec!["web1".into()],
            failed: vec![],
        };
        assert_eq!(summary_status(&ok), ExitCode::SUCCESS);
        let failed = Summary {
            succeeded: vec![],
            failed: vec!["db1".into()],
        };
        assert_eq!(summary_status(&failed), ExitCode::FAILURE);
    }

    #[test]
    fn worker_status_is_mirrored() {
        assert_eq!(worker_status(0), ExitCode::SUCCESS);
        assert_eq!(worker_status(3), ExitCode::from(3));
        assert_eq!(worker_status(-1), ExitCode::FAILURE);
    }
}
