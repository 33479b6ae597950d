//! `jailctl list`: List the live jails.

use std::process::ExitCode;

use anyhow::Context;
use clap::Args;
use jailctl_runtime::engine::Engine;

use crate::output;

/// Arguments for the `list` command.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Show id, path and addresses next to each hostname.
    #[arg(short, long)]
    pub long: bool,

    /// Print the jails as JSON.
    #[arg(long, conflicts_with = "long")]
    pub json: bool,
}

/// Executes the `list` command.
///
/// # Errors
///
/// Returns an error if run inside a jail or the jail list cannot be read.
pub fn execute(args: &ListArgs) -> anyhow::Result<ExitCode> {
    super::require_host("list")?;
    let jails = Engine::new().list().context("couldn't list jails")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&jails)?);
    } else if args.long {
        println!("{}", output::long_header());
        for jail in &jails {
            println!("{}", output::long_row(jail));
        }
    } else {
        for jail in &jails {
            println!("{}", jail.hostname);
        }
    }
    Ok(ExitCode::SUCCESS)
}
