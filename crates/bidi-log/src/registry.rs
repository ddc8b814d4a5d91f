//! Subscription registry: the dispatch core of the inspector.
//!
//! The registry keeps, per category, an ordered list of `(filter, callback)`
//! pairs. Categories overlap: an entry is tagged with every category it
//! belongs to (a console entry is `{Console, Any}`, a thrown exception is
//! `{JavascriptException, Any}`) and dispatch walks those tags in order.
//!
//! Callbacks run synchronously on the dispatching task. A panicking callback
//! is caught, counted and reported through `tracing`; the remaining callbacks
//! still receive the entry.

use crate::entry::{EntryType, LogEntry};
use crate::error::InspectorError;
use crate::filter::Filter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::error;

/// A log category callbacks can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    /// Entries with `type == console`
    Console,
    /// Javascript entries that are not thrown exceptions
    JavascriptLog,
    /// Javascript entries that represent thrown exceptions
    JavascriptException,
    /// Every entry, in addition to its type-specific category
    Any,
}

impl Category {
    /// Returns the categories an entry belongs to, type-specific first.
    #[must_use]
    pub fn tags_for(entry: &LogEntry) -> Vec<Category> {
        let specific = match entry.kind {
            EntryType::Console => Some(Category::Console),
            EntryType::Javascript if entry.is_exception() => Some(Category::JavascriptException),
            EntryType::Javascript => Some(Category::JavascriptLog),
            EntryType::Other(_) => None,
        };
        specific.into_iter().chain([Category::Any]).collect()
    }

    /// Returns the stable name of this category.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Console => "console",
            Category::JavascriptLog => "javascriptLog",
            Category::JavascriptException => "javascriptException",
            Category::Any => "any",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle identifying one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Returns the numeric id.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Callback invoked with every matching entry.
pub type Callback = Arc<dyn Fn(&LogEntry) + Send + Sync>;

#[derive(Clone)]
struct Registration {
    id: SubscriptionId,
    filter: Filter,
    callback: Callback,
}

/// Ordered `(filter, callback)` lists per category.
///
/// Owned exclusively by one inspector; never shared across sessions.
pub struct Registry {
    buckets: Mutex<HashMap<Category, Vec<Registration>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    failures: AtomicU64,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            failures: AtomicU64::new(0),
        }
    }

    /// Registers a callback for a category.
    ///
    /// Registrations for the same category fire in registration order.
    /// Returns `None` once the registry has been closed.
    pub fn register(
        &self,
        category: Category,
        filter: Filter,
        callback: Callback,
    ) -> Option<SubscriptionId> {
        if self.is_closed() {
            return None;
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(category)
            .or_default()
            .push(Registration {
                id,
                filter,
                callback,
            });
        Some(id)
    }

    /// Removes a single registration. Returns true if it existed.
    pub fn unregister(&self, id: SubscriptionId) -> bool {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        for list in buckets.values_mut() {
            if let Some(pos) = list.iter().position(|r| r.id == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Delivers an entry to every matching registration.
    ///
    /// Returns the number of callbacks that were invoked (including ones
    /// that panicked). Entries rejected by a filter are not buffered.
    pub fn dispatch(&self, entry: &LogEntry) -> usize {
        if self.is_closed() {
            return 0;
        }

        // Snapshot so callbacks may register or unregister without deadlocking.
        let targets: Vec<(Category, Registration)> = {
            let buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
            Category::tags_for(entry)
                .into_iter()
                .filter_map(|tag| buckets.get(&tag).map(|list| (tag, list.clone())))
                .flat_map(|(tag, list)| list.into_iter().map(move |r| (tag, r)))
                .collect()
        };

        let mut invoked = 0;
        for (category, registration) in targets {
            if self.is_closed() {
                break;
            }
            if !registration.filter.matches(entry) {
                continue;
            }

            invoked += 1;
            let callback = &registration.callback;
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(entry))) {
                self.failures.fetch_add(1, Ordering::Relaxed);
                let err = InspectorError::Callback {
                    category: category.to_string(),
                    message: panic_message(payload.as_ref()),
                };
                error!(
                    category = %category,
                    subscription = %registration.id,
                    "{err}"
                );
            }
        }
        invoked
    }

    /// Number of registrations currently held for a category.
    #[must_use]
    pub fn len(&self, category: Category) -> usize {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&category)
            .map_or(0, Vec::len)
    }

    /// Returns true if no callbacks are registered at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .all(Vec::is_empty)
    }

    /// Number of callback invocations that panicked.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Clears every registration; later dispatches invoke nothing.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Returns true once `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("closed", &self.is_closed())
            .field("failures", &self.failures())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "callback panicked".to_string()
    }
}
