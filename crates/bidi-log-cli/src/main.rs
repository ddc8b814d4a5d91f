//! `bidi-log` entry point: parse arguments, set up logging, dispatch.

use bidi_log_cli::{cli, commands, logger};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    logger::init_logger(args.verbose, args.quiet, args.no_color);

    match args.command {
        cli::Command::Tail(tail_args) => commands::tail_execute(tail_args).await,
        cli::Command::Replay(replay_args) => commands::replay_execute(replay_args).await,
    }
}
