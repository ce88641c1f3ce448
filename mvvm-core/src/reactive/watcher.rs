//! Watcher Implementation
//!
//! A Watcher is the consumer side of the reactive core: it reads one field
//! path of a model, caches what it saw, and runs a reaction when a
//! notification brings a different value.
//!
//! # Lifecycle
//!
//! 1. Construction runs the getter inside a tracking frame. Every tracked
//!    field the getter reads subscribes the watcher, once each.
//!
//! 2. A write to one of those fields calls [`Watcher::update`]. The update
//!    re-reads the path without subscribing, compares with the cache, and
//!    only on a difference stores the new value and runs the reaction.
//!
//! 3. [`Watcher::teardown`] removes the watcher from every subscriber set it
//!    joined. Nothing is released automatically on drop.
//!
//! The watcher holds a weak reference to the model root; once the model is
//! gone, updates read nothing and react to nothing.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::context::ReactiveContext;
use super::dep::WeakDep;
use super::path::FieldPath;
use super::value::{Object, Value, WeakObject};
use crate::error::Result;

/// Unique identifier for a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(u64);

impl WatcherId {
    /// Generate a new unique watcher ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for WatcherId {
    fn default() -> Self {
        Self::new()
    }
}

type Getter = Arc<dyn Fn(&Object) -> Value + Send + Sync>;
type Reaction = Arc<dyn Fn(&Value, &Watcher) -> Result<()> + Send + Sync>;

/// A consumer of one model path.
///
/// # Example
///
/// ```rust,ignore
/// let model = observe(json!({ "count": 0 }));
/// let model = model.as_object().unwrap();
///
/// let watcher = Watcher::new(model, "count", |value, _| {
///     println!("count is now {value}");
///     Ok(())
/// })?;
///
/// model.set("count", 5)?;  // Prints: "count is now 5"
/// ```
#[derive(Clone)]
pub struct Watcher {
    inner: Arc<WatcherInner>,
}

struct WatcherInner {
    id: WatcherId,

    /// Model root. Not owned.
    target: WeakObject,

    /// Human-readable description of what is watched.
    expression: String,

    getter: Getter,
    reaction: Reaction,

    /// Last value seen by the getter.
    value: Mutex<Value>,

    /// Subscriber sets joined, for teardown.
    deps: Mutex<Vec<WeakDep>>,

    active: AtomicBool,

    /// Number of times the reaction has run.
    run_count: AtomicUsize,
}

impl Watcher {
    /// Watch a key or dotted path of `target`.
    pub fn new<F>(target: &Object, path: &str, reaction: F) -> Result<Self>
    where
        F: Fn(&Value, &Watcher) -> Result<()> + Send + Sync + 'static,
    {
        let path = FieldPath::parse(path)?;
        Ok(Self::with_path(target, path, reaction))
    }

    /// Watch an already parsed path.
    pub fn with_path<F>(target: &Object, path: FieldPath, reaction: F) -> Self
    where
        F: Fn(&Value, &Watcher) -> Result<()> + Send + Sync + 'static,
    {
        let expression = path.to_string();
        Self::with_getter(target, expression, move |root| root.get_path(&path), reaction)
    }

    /// Watch whatever `getter` reads.
    ///
    /// The getter runs once now, with tracking, and again without tracking
    /// on every notification.
    pub fn with_getter<G, F>(
        target: &Object,
        expression: impl Into<String>,
        getter: G,
        reaction: F,
    ) -> Self
    where
        G: Fn(&Object) -> Value + Send + Sync + 'static,
        F: Fn(&Value, &Watcher) -> Result<()> + Send + Sync + 'static,
    {
        let watcher = Self {
            inner: Arc::new(WatcherInner {
                id: WatcherId::new(),
                target: target.downgrade(),
                expression: expression.into(),
                getter: Arc::new(getter),
                reaction: Arc::new(reaction),
                value: Mutex::new(Value::Null),
                deps: Mutex::new(Vec::new()),
                active: AtomicBool::new(true),
                run_count: AtomicUsize::new(0),
            }),
        };

        let initial = watcher.get(target);
        *watcher.inner.value.lock() = initial;
        debug!(
            watcher = ?watcher.inner.id,
            expression = %watcher.inner.expression,
            deps = watcher.dependency_count(),
            "watcher created"
        );

        watcher
    }

    /// Run the getter inside a tracking frame for this watcher.
    fn get(&self, target: &Object) -> Value {
        let _ctx = ReactiveContext::enter(self.clone());
        let value = (self.inner.getter)(target);

        let joined = ReactiveContext::take_dependencies();
        self.inner
            .deps
            .lock()
            .extend(joined.iter().map(|dep| dep.downgrade()));

        value
    }

    /// React to a change notification.
    ///
    /// Re-reads without subscribing; runs the reaction only if the value
    /// differs from the cached one.
    pub fn update(&self) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        let Some(target) = self.inner.target.upgrade() else {
            return Ok(());
        };

        let new_value = {
            let _ctx = ReactiveContext::untracked();
            (self.inner.getter)(&target)
        };

        {
            let mut cached = self.inner.value.lock();
            if *cached == new_value {
                return Ok(());
            }
            *cached = new_value.clone();
        }

        self.inner.run_count.fetch_add(1, Ordering::SeqCst);
        trace!(watcher = ?self.inner.id, expression = %self.inner.expression, "react");

        let _ctx = ReactiveContext::untracked();
        (self.inner.reaction)(&new_value, self)
    }

    /// Leave every subscriber set this watcher joined.
    ///
    /// After teardown the watcher never reacts again.
    pub fn teardown(&self) {
        if !self.inner.active.swap(false, Ordering::SeqCst) {
            return;
        }

        let deps: Vec<WeakDep> = std::mem::take(&mut *self.inner.deps.lock());
        for dep in deps.iter().filter_map(WeakDep::upgrade) {
            dep.remove_watcher(self.inner.id);
        }
        debug!(watcher = ?self.inner.id, expression = %self.inner.expression, "watcher torn down");
    }

    /// Get the watcher's unique ID.
    pub fn id(&self) -> WatcherId {
        self.inner.id
    }

    pub fn expression(&self) -> &str {
        &self.inner.expression
    }

    /// The last value the watcher saw.
    pub fn value(&self) -> Value {
        self.inner.value.lock().clone()
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Get the number of times the reaction has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Number of subscriber sets joined.
    pub fn dependency_count(&self) -> usize {
        self.inner.deps.lock().len()
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.inner.id)
            .field("expression", &self.inner.expression)
            .field("value", &self.value())
            .field("run_count", &self.run_count())
            .field("active", &self.is_active())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BindError;
    use crate::reactive::observe;
    use serde_json::json;

    fn model(data: serde_json::Value) -> Object {
        observe(data).as_object().cloned().unwrap()
    }

    #[test]
    fn construction_caches_and_subscribes() {
        let model = model(json!({ "count": 3 }));
        let watcher = Watcher::new(&model, "count", |_, _| Ok(())).unwrap();

        assert_eq!(watcher.value(), Value::Int(3));
        assert_eq!(watcher.dependency_count(), 1);
        assert_eq!(model.field("count").unwrap().subscriber_count(), 1);
        assert_eq!(watcher.run_count(), 0);
    }

    #[test]
    fn invalid_path_is_rejected() {
        let model = model(json!({ "count": 3 }));
        assert!(matches!(
            Watcher::new(&model, "a..b", |_, _| Ok(())),
            Err(BindError::InvalidPath { .. })
        ));
    }

    #[test]
    fn reaction_receives_watcher_as_context() {
        let model = model(json!({ "count": 0 }));
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();

        let watcher = Watcher::new(&model, "count", move |_, this| {
            *seen_clone.lock() = Some(this.id());
            Ok(())
        })
        .unwrap();

        model.set("count", 1).unwrap();
        assert_eq!(*seen.lock(), Some(watcher.id()));
    }

    #[test]
    fn update_is_no_op_when_cache_matches() {
        let model = model(json!({ "count": 0 }));
        let watcher = Watcher::new(&model, "count", |_, _| Ok(())).unwrap();

        watcher.update().unwrap();
        assert_eq!(watcher.run_count(), 0);
    }

    #[test]
    fn update_does_not_resubscribe() {
        let model = model(json!({ "count": 0 }));
        let watcher = Watcher::new(&model, "count", |_, _| Ok(())).unwrap();

        model.set("count", 1).unwrap();
        model.set("count", 2).unwrap();

        assert_eq!(watcher.run_count(), 2);
        assert_eq!(model.field("count").unwrap().subscriber_count(), 1);
    }

    #[test]
    fn teardown_releases_subscriptions() {
        let model = model(json!({ "count": 0 }));
        let watcher = Watcher::new(&model, "count", |_, _| Ok(())).unwrap();

        watcher.teardown();
        assert!(!watcher.is_active());
        assert_eq!(model.field("count").unwrap().subscriber_count(), 0);

        model.set("count", 9).unwrap();
        assert_eq!(watcher.run_count(), 0);

        // Second teardown is harmless.
        watcher.teardown();
    }

    #[test]
    fn dropped_model_stops_updates() {
        let model = model(json!({ "count": 0 }));
        let field = model.field("count").unwrap();
        let watcher = Watcher::new(&model, "count", |_, _| Ok(())).unwrap();
        drop(model);

        field.set(Value::Int(1)).unwrap();
        assert_eq!(watcher.run_count(), 0);
    }

    #[test]
    fn failing_reaction_surfaces_from_write() {
        let model = model(json!({ "count": 0 }));
        let _watcher = Watcher::new(&model, "count", |_, _| Err(BindError::reaction("boom"))).unwrap();

        let err = model.set("count", 1).unwrap_err();
        assert!(matches!(err, BindError::Reaction { message } if message == "boom"));
        // The write itself went through before fan-out.
        assert_eq!(model.peek("count"), Value::Int(1));
    }
}
