//! Reactive Context
//!
//! The reactive context records which watcher is currently evaluating, so
//! that a field read can subscribe that watcher without being told about it.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. A watcher pushes a frame before
//! running its getter and the guard pops it on drop, so the slot is reset even
//! if the getter panics. Nested evaluation works: the inner frame shadows the
//! outer one and the outer registration resumes once it is popped.
//!
//! A frame may also be untracked. Watchers push one while reacting, so reads
//! made by a reaction never subscribe an outer evaluating watcher.
//!
//! Each frame keeps the set of subscriber sets already joined during this
//! evaluation; reading the same field twice subscribes once.

use std::cell::RefCell;
use std::collections::HashSet;

use tracing::trace;

use super::dep::{Dep, DepId};
use super::watcher::{Watcher, WatcherId};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
struct ContextEntry {
    /// The evaluating watcher, or `None` for an untracked frame.
    watcher: Option<Watcher>,
    /// Subscriber sets joined during this evaluation.
    visited: HashSet<DepId>,
    /// The same sets, in the order they were joined.
    dependencies: Vec<Dep>,
}

/// Guard that pops the context when dropped.
pub struct ReactiveContext {
    watcher_id: Option<WatcherId>,
}

impl ReactiveContext {
    /// Enter a tracking frame for `watcher`.
    ///
    /// While the returned guard lives, tracked reads subscribe `watcher`.
    pub fn enter(watcher: Watcher) -> Self {
        let watcher_id = Some(watcher.id());
        Self::push(Some(watcher));
        Self { watcher_id }
    }

    /// Enter a frame in which reads subscribe nothing.
    pub fn untracked() -> Self {
        Self::push(None);
        Self { watcher_id: None }
    }

    fn push(watcher: Option<Watcher>) {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                watcher,
                visited: HashSet::new(),
                dependencies: Vec::new(),
            });
        });
    }

    /// Whether a read right now would subscribe a watcher.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .is_some_and(|entry| entry.watcher.is_some())
        })
    }

    /// The watcher a read would subscribe right now.
    pub fn current_watcher() -> Option<Watcher> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|entry| entry.watcher.clone())
        })
    }

    /// Number of frames on this thread's stack.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }

    /// Subscribe the evaluating watcher to `dep`, once per evaluation.
    pub(crate) fn track(dep: &Dep) {
        let watcher = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let entry = stack.last_mut()?;
            let watcher = entry.watcher.clone()?;
            if !entry.visited.insert(dep.id()) {
                trace!(field = dep.label(), watcher = ?watcher.id(), "already tracked");
                return None;
            }
            entry.dependencies.push(dep.clone());
            Some(watcher)
        });

        if let Some(watcher) = watcher {
            dep.add_watcher(watcher);
        }
    }

    /// Take the subscriber sets joined so far in the current frame.
    pub(crate) fn take_dependencies() -> Vec<Dep> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow_mut()
                .last_mut()
                .map(|entry| std::mem::take(&mut entry.dependencies))
                .unwrap_or_default()
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.watcher.as_ref().map(Watcher::id),
                    self.watcher_id,
                    "ReactiveContext mismatch"
                );
            }
        });
    }
}
