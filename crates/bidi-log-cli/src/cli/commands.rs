use bidi_log::{Filter, FilterBy};
use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::cli::enums::CategoryArg;

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print log entries from a live BiDi session until Ctrl-C
    ///
    /// Connects to the WebSocket URL of a BiDi endpoint (for example the
    /// `webSocketUrl` capability returned by a WebDriver server).
    Tail(TailArgs),

    /// Print log entries from a JSONL recording
    ///
    /// Each line holds one raw event: {"method": "...", "params": {...}}.
    /// Files written by `tail --record` can be replayed directly.
    Replay(ReplayArgs),
}

/// Entry selection shared by all subcommands
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Category of entries to print
    #[arg(short, long, value_enum, default_value = "any")]
    pub category: CategoryArg,

    /// Only print entries with exactly this level (debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    pub level: Option<String>,

    /// Only print entries whose text contains this string
    #[arg(long, value_name = "TEXT")]
    pub contains: Option<String>,

    /// Print each entry as one JSON object per line
    #[arg(long)]
    pub json: bool,
}

impl FilterArgs {
    /// Filters selected by the flags; every one must match.
    #[must_use]
    pub fn filters(&self) -> Vec<Filter> {
        let mut filters = Vec::new();
        if let Some(level) = &self.level {
            filters.push(FilterBy::log_level(level.as_str()));
        }
        if let Some(needle) = &self.contains {
            filters.push(FilterBy::text_contains(needle.as_str()));
        }
        filters
    }
}

/// Arguments for the tail command
#[derive(Args, Debug)]
pub struct TailArgs {
    /// WebSocket URL of the BiDi endpoint (overrides configuration)
    #[arg(short, long, value_name = "URL")]
    pub url: Option<String>,

    /// Path to a TOML configuration file (default: ./bidi-log.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Also append every raw log.entryAdded event to this JSONL file
    #[arg(long, value_name = "FILE")]
    pub record: Option<PathBuf>,

    #[command(flatten)]
    pub filter: FilterArgs,
}

/// Arguments for the replay command
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// JSONL recording to replay
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Give up waiting for delivery after this many milliseconds
    #[arg(long, value_name = "MS", default_value_t = 5000)]
    pub timeout_ms: u64,

    #[command(flatten)]
    pub filter: FilterArgs,
}
