//! Command-line interface definition for `bidi-log`.
//!
//! # Command Structure
//!
//! - `bidi-log tail` - Print log entries of a live BiDi session
//! - `bidi-log replay` - Print log entries from a JSONL recording

mod commands;
pub mod enums;
mod tests;

use clap::Parser;

pub use commands::{Command, FilterArgs, ReplayArgs, TailArgs};
pub use enums::*;

/// bidi-log - browser log entries over WebDriver BiDi
#[derive(Parser, Debug)]
#[command(
    name = "bidi-log",
    version,
    about = "Tail or replay browser log entries over WebDriver BiDi",
    long_about = "bidi-log subscribes to log.entryAdded on a WebDriver BiDi session and prints\n\
                  console messages, javascript logs and uncaught exceptions as they arrive.\n\
                  Recorded sessions can be replayed through the same filters."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all diagnostics except errors
    ///
    /// Log entries are still printed to stdout.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored diagnostics
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}
