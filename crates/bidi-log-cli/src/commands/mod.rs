//! Command implementations.
//!
//! - [`tail`] - Follow a live BiDi session
//! - [`replay`] - Feed a JSONL recording through the inspector

pub mod replay;
pub mod tail;

use crate::cli::FilterArgs;
use crate::output::{print_entry, OutputMode};
use anyhow::{Context, Result};
use bidi_log::{Category, LogInspector, SubscriptionId};

pub use replay::execute as replay_execute;
pub use tail::execute as tail_execute;

/// Registers a callback that prints entries selected by `args` to stdout.
///
/// The first filter is evaluated by the registry, the others in the
/// callback, so all of them must match.
pub(crate) async fn register_printer(
    inspector: &LogInspector,
    args: &FilterArgs,
) -> Result<SubscriptionId> {
    let mode = OutputMode::from_json_flag(args.json);
    let mut filters = args.filters().into_iter();
    let primary = filters.next().unwrap_or_default();
    let rest: Vec<_> = filters.collect();
    let category = Category::from(args.category);

    inspector
        .subscribe(category, primary, move |entry| {
            if rest.iter().all(|f| f.matches(entry)) {
                print_entry(entry, mode);
            }
        })
        .await
        .with_context(|| format!("failed to subscribe to {category} entries"))
}
