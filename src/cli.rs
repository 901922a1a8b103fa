//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Reserve niconico live timeshifts by keyword and record their replays.
///
/// Run `reserve` periodically to keep the reservation list filled with the
/// earliest matching programs, and `download` to record every open replay.
#[derive(Parser, Debug)]
#[command(name = "timeshift")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/timeshift/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory, overriding `data_dir` from the config file
    #[arg(long, value_name = "DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Search for upcoming programs and fill the reservation list
    Reserve,
    /// Record every reservation whose replay is open
    Download,
}
