//! `jailctl ps`: Show the processes of a jail.

use std::process::ExitCode;

use clap::Args;
use jailctl_runtime::engine::Engine;

/// Arguments for the `ps` command.
#[derive(Args, Debug)]
pub struct PsArgs {
    /// Jail hostname or numeric id.
    pub jail: String,

    /// Print only the pids, on one line.
    #[arg(short = 'i', long)]
    pub pids: bool,

    /// Extra arguments passed to ps.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, conflicts_with = "pids")]
    pub ps_args: Vec<String>,
}

/// Executes the `ps` command.
///
/// The listing runs from a worker attached to the jail, so it only sees
/// that jail's processes.
///
/// # Errors
///
/// Returns an error if run inside a jail, the jail is unknown, or the
/// worker cannot be started.
pub fn execute(args: &PsArgs) -> anyhow::Result<ExitCode> {
    super::require_host("ps")?;
    let engine = Engine::new();
    let code = if args.pids {
        engine.pids(&args.jail)?
    } else {
        engine.ps(&args.jail, &args.ps_args)?
    };
    Ok(super::worker_status(code))
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use crate::commands::{Cli, Command};

    #[test]
    fn extra_arguments_reach_ps() {
        let cli = Cli::try_parse_from(["jailctl", "ps", "web1", "-auxww"]).unwrap();
        let Command::Ps(args) = cli.command else {
            panic!("expected ps");
        };
        assert_eq!(args.jail, "web1");
        assert_eq!(args.ps_args, ["-auxww"]);
        assert!(!args.pids);
    }

    #[test]
    fn pid_listing_flag() {
        let cli = Cli::try_parse_from(["jailctl", "ps", "-i", "3"]).unwrap();
        let Command::Ps(args) = cli.command else {
            panic!("expected ps");
        };
        assert!(args.pids);
        assert_eq!(args.jail, "3");
    }
}
