//! Reactive Core
//!
//! This module implements dependency tracking for the binding engine:
//! tracked fields, their subscriber sets, and the watchers that consume them.
//!
//! # Concepts
//!
//! ## Fields
//!
//! [`observe`] turns plain data into a model in which every key of every
//! mapping is a [`Field`]. Reading a field while a watcher is evaluating
//! subscribes that watcher; writing a different value notifies every
//! subscriber, synchronously and in subscription order.
//!
//! ## Subscriber sets
//!
//! Each field owns a [`Dep`], the ordered list of watchers to re-run on
//! change.
//!
//! ## Watchers
//!
//! A [`Watcher`] reads one path of the model, caches the result, and runs a
//! reaction when a notification brings a different value.
//!
//! # Implementation Notes
//!
//! The evaluating watcher is found through a thread-local context stack
//! ([`ReactiveContext`]) rather than passed to every read. There is no
//! scheduler: a write returns only after every affected reaction has run.

mod context;
mod dep;
mod observer;
mod path;
mod runtime;
mod value;
mod watcher;

pub use context::ReactiveContext;
pub use dep::{Dep, DepId};
pub use observer::{observe, observe_map, Field};
pub use path::FieldPath;
pub use runtime::{NotifyPolicy, Runtime, RuntimeConfig};
pub use value::{Object, Value, WeakObject};
pub use watcher::{Watcher, WatcherId};
