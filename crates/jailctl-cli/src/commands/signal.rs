//! `jailctl signal`: Send one signal to the supervisor of each jail.

use std::process::ExitCode;

use clap::{ArgGroup, Args};
use jailctl_common::config::SignalConfig;
use jailctl_core::signal::{self, Signal};
use jailctl_runtime::engine::Engine;

/// Arguments for the `signal` command.
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("action").required(true).args(["halt", "reboot", "signal"])))]
pub struct SignalArgs {
    /// Jail hostnames or numeric ids.
    #[arg(required = true)]
    pub jails: Vec<String>,

    /// Ask the supervisor to halt the jail (SIGQUIT).
    #[arg(short = 'H', long)]
    pub halt: bool,

    /// Ask the supervisor to reboot the jail (SIGHUP).
    #[arg(short, long)]
    pub reboot: bool,

    /// Send this signal, by name or number.
    #[arg(short, long, value_name = "NAME", value_parser = parse_signal)]
    pub signal: Option<Signal>,
}

impl SignalArgs {
    /// The signal selected by the flags.
    #[must_use]
    pub fn selected(&self) -> Signal {
        if self.halt {
            Signal::SIGQUIT
        } else if self.reboot {
            Signal::SIGHUP
        } else {
            self.signal.unwrap_or(Signal::SIGTERM)
        }
    }
}

fn parse_signal(name: &str) -> Result<Signal, String> {
    signal::parse(name).map_err(|e| e.to_string())
}

/// Executes the `signal` command.
///
/// # Errors
///
/// Returns an error if procfs is not mounted or the jail list cannot be
/// read.
pub fn execute(args: &SignalArgs, quiet: bool) -> anyhow::Result<ExitCode> {
    let config = SignalConfig {
        quiet,
        ..SignalConfig::default()
    };
    let summary = Engine::new().signal(&args.jails, args.selected(), &config)?;
    Ok(super::summary_status(&summary))
}
