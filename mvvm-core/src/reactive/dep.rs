//! Subscriber sets.
//!
//! Each tracked field owns one [`Dep`]: the ordered list of watchers that read
//! the field, and the fan-out that re-runs them when the field changes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{trace, warn};

use super::context::ReactiveContext;
use super::runtime::{NotifyGuard, NotifyPolicy, Runtime};
use super::watcher::{Watcher, WatcherId};
use crate::error::{BindError, Result};

/// Unique identifier for a subscriber set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepId(u64);

impl DepId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

type WatcherList = SmallVec<[Watcher; 4]>;

/// The subscriber set of one tracked field.
#[derive(Clone)]
pub struct Dep {
    inner: Arc<DepInner>,
}

struct DepInner {
    id: DepId,
    /// Key of the owning field, for diagnostics.
    label: String,
    watchers: Mutex<WatcherList>,
}

#[derive(Clone)]
pub(crate) struct WeakDep {
    inner: Weak<DepInner>,
}

impl Dep {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(DepInner {
                id: DepId::next(),
                label: label.into(),
                watchers: Mutex::new(SmallVec::new()),
            }),
        }
    }

    pub fn id(&self) -> DepId {
        self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Append a watcher.
    ///
    /// No uniqueness check: adding the same watcher twice makes it run twice
    /// per notification. Reads through [`depend`](Self::depend) are
    /// deduplicated per evaluation instead.
    pub fn add_watcher(&self, watcher: Watcher) {
        trace!(field = %self.inner.label, watcher = ?watcher.id(), "subscribe");
        self.inner.watchers.lock().push(watcher);
    }

    /// Register the evaluating watcher, if there is one.
    pub fn depend(&self) {
        ReactiveContext::track(self);
    }

    /// Drop every entry for `watcher`.
    pub fn remove_watcher(&self, watcher: WatcherId) {
        self.inner.watchers.lock().retain(|w| w.id() != watcher);
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.lock().len()
    }

    /// Watcher IDs in notification order.
    pub fn watcher_ids(&self) -> Vec<WatcherId> {
        self.inner.watchers.lock().iter().map(Watcher::id).collect()
    }

    /// Run `update` on every watcher, in the order they subscribed.
    ///
    /// The list is snapshotted first, so watchers added during the pass are
    /// not run until the next one. Under [`NotifyPolicy::FailFast`] the first
    /// failing watcher aborts the pass; under [`NotifyPolicy::Isolate`] every
    /// watcher runs and failures are collected.
    pub fn notify(&self) -> Result<()> {
        match self.begin_notify()? {
            Some(pass) => pass.run(),
            None => Ok(()),
        }
    }

    /// Claim a fan-out pass without running it.
    ///
    /// Fails with [`BindError::Cycle`] or [`BindError::DepthExceeded`] when
    /// the pass may not start. Returns `None` when there is nobody to notify.
    pub(crate) fn begin_notify(&self) -> Result<Option<NotifyPass>> {
        let watchers: WatcherList = self.inner.watchers.lock().clone();
        if watchers.is_empty() {
            return Ok(None);
        }

        let guard = Runtime::enter_notify(self)?;
        Ok(Some(NotifyPass {
            label: self.inner.label.clone(),
            watchers,
            _guard: guard,
        }))
    }

    pub(crate) fn downgrade(&self) -> WeakDep {
        WeakDep {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// A fan-out pass that has been admitted by the runtime.
///
/// Holds the notify-stack entry until the pass is finished or dropped.
pub(crate) struct NotifyPass {
    label: String,
    watchers: WatcherList,
    _guard: NotifyGuard,
}

impl NotifyPass {
    pub(crate) fn run(self) -> Result<()> {
        let policy = Runtime::config().notify_policy;
        trace!(field = %self.label, count = self.watchers.len(), "notify");

        let mut failures = Vec::new();
        for watcher in &self.watchers {
            if let Err(err) = watcher.update() {
                match policy {
                    NotifyPolicy::FailFast => return Err(err),
                    NotifyPolicy::Isolate => {
                        warn!(
                            field = %self.label,
                            watcher = ?watcher.id(),
                            error = %err,
                            "reaction failed"
                        );
                        failures.push(err);
                    }
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(BindError::Propagation { failures })
        }
    }
}

impl WeakDep {
    pub(crate) fn upgrade(&self) -> Option<Dep> {
        self.inner.upgrade().map(|inner| Dep { inner })
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("watcher_count", &self.watcher_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Object, Value};
    use std::sync::atomic::AtomicUsize;

    fn counting_watcher(model: &Object, hits: &Arc<AtomicUsize>) -> Watcher {
        let hits = hits.clone();
        Watcher::new(model, "count", move |_, _| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap()
    }

    #[test]
    fn add_watcher_does_not_deduplicate() {
        let model = Object::new([("count", Value::Int(0))]);
        let hits = Arc::new(AtomicUsize::new(0));
        let watcher = counting_watcher(&model, &hits);

        let dep = Dep::new("other");
        dep.add_watcher(watcher.clone());
        dep.add_watcher(watcher.clone());
        assert_eq!(dep.watcher_count(), 2);
        assert_eq!(dep.watcher_ids(), vec![watcher.id(), watcher.id()]);

        dep.remove_watcher(watcher.id());
        assert_eq!(dep.watcher_count(), 0);
    }

    #[test]
    fn notify_on_empty_set_is_a_no_op() {
        let dep = Dep::new("empty");
        assert!(dep.notify().is_ok());
    }

    #[test]
    fn notify_without_change_skips_reaction() {
        let model = Object::new([("count", Value::Int(0))]);
        let hits = Arc::new(AtomicUsize::new(0));
        let _watcher = counting_watcher(&model, &hits);

        // The field value did not move, so the watcher's cache suppresses it.
        model.field("count").unwrap().dep().notify().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn weak_dep_dies_with_field() {
        let dep = Dep::new("temp");
        let weak = dep.downgrade();
        assert!(weak.upgrade().is_some());
        drop(dep);
        assert!(weak.upgrade().is_none());
    }
}
