//! Declarative filters over log entries.
//!
//! Filters are a small closed set of tagged variants rather than arbitrary
//! closures, so they can be compared, serialized into config files and
//! tested on their own. Every filter is a pure function of the entry.

use crate::entry::{LogEntry, LogLevel};
use serde::{Deserialize, Serialize};

/// A predicate over `LogEntry`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Filter {
    /// Accepts every entry.
    #[default]
    Always,
    /// Accepts entries whose level equals the given level exactly.
    LevelEquals(LogLevel),
    /// Accepts entries whose text contains the given substring.
    TextContains(String),
    /// Accepts console entries made through the given console method.
    MethodEquals(String),
}

impl Filter {
    /// Evaluates the filter against an entry.
    #[must_use]
    pub fn matches(&self, entry: &LogEntry) -> bool {
        match self {
            Filter::Always => true,
            Filter::LevelEquals(level) => entry.level == *level,
            Filter::TextContains(needle) => entry
                .text
                .as_deref()
                .is_some_and(|text| text.contains(needle.as_str())),
            Filter::MethodEquals(method) => entry.method.as_deref() == Some(method.as_str()),
        }
    }
}

/// Constructors for the built-in filters.
///
/// # Example
///
/// ```
/// use bidi_log::{Filter, FilterBy, LogLevel};
///
/// assert_eq!(FilterBy::log_level("error"), Filter::LevelEquals(LogLevel::Error));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FilterBy;

impl FilterBy {
    /// Accepts only entries whose level equals `level` (exact match).
    pub fn log_level(level: impl Into<LogLevel>) -> Filter {
        Filter::LevelEquals(level.into())
    }

    /// Accepts only entries whose text contains `needle`.
    pub fn text_contains(needle: impl Into<String>) -> Filter {
        Filter::TextContains(needle.into())
    }

    /// Accepts only console entries produced by `method` (e.g. `"warn"`).
    pub fn method(method: impl Into<String>) -> Filter {
        Filter::MethodEquals(method.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryType;
    use proptest::prelude::*;

    fn entry(level: &str, text: Option<&str>, method: Option<&str>) -> LogEntry {
        LogEntry {
            kind: EntryType::Console,
            level: LogLevel::from(level),
            text: text.map(str::to_string),
            method: method.map(str::to_string),
            realm: None,
            args: vec![],
            stack_trace: None,
            timestamp: 0,
            source: None,
        }
    }

    #[test]
    fn level_filter_is_exact() {
        let filter = FilterBy::log_level("error");
        assert!(filter.matches(&entry("error", None, None)));
        assert!(!filter.matches(&entry("warn", None, None)));
        assert!(!filter.matches(&entry("Error", None, None)));
    }

    #[test]
    fn text_and_method_filters() {
        let e = entry("info", Some("Hello, world!"), Some("log"));
        assert!(FilterBy::text_contains("world").matches(&e));
        assert!(!FilterBy::text_contains("moon").matches(&e));
        assert!(FilterBy::method("log").matches(&e));
        assert!(!FilterBy::method("error").matches(&e));
        assert!(!FilterBy::text_contains("").matches(&entry("info", None, None)));
    }

    #[test]
    fn filters_serialize_as_tagged_values() {
        let json = serde_json::to_value(FilterBy::log_level("warn")).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "levelEquals", "value": "warn"}));

        let back: Filter = serde_json::from_value(json).unwrap();
        assert_eq!(back, Filter::LevelEquals(LogLevel::Warning));

        let always: Filter = serde_json::from_value(serde_json::json!({"kind": "always"})).unwrap();
        assert_eq!(always, Filter::Always);
    }

    proptest! {
        #[test]
        fn always_accepts_everything(level in "[a-z]{1,8}", text in proptest::option::of(".{0,20}")) {
            prop_assert!(Filter::Always.matches(&entry(&level, text.as_deref(), None)));
        }

        #[test]
        fn level_filter_matches_iff_levels_equal(a in "[a-z]{1,6}", b in "[a-z]{1,6}") {
            let matched = FilterBy::log_level(a.as_str()).matches(&entry(&b, None, None));
            prop_assert_eq!(matched, LogLevel::from(a.as_str()) == LogLevel::from(b.as_str()));
        }
    }
}
