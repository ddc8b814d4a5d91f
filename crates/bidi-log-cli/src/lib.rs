//! Command line front end for `bidi-log`.
//!
//! `bidi-log tail` follows a live BiDi session, `bidi-log replay` feeds a
//! recorded JSONL file through the same inspector pipeline. Log entries go to
//! stdout; diagnostics go to stderr through `tracing`.

pub mod cli;
pub mod commands;
pub mod logger;
pub mod output;
