//! MVVM Core
//!
//! This crate provides the dependency-tracking core of a minimal MVVM
//! binding engine. It implements:
//!
//! - Tracked model fields built recursively over plain data
//! - Per-field subscriber sets with ordered, synchronous fan-out
//! - Automatic dependency discovery through a thread-local context
//! - Watchers that cache a value and react only to real changes
//! - A small presentation tree and the compiler that binds it to a model
//!
//! # Architecture
//!
//! - `reactive`: tracked fields, subscriber sets, watchers, runtime config
//! - `view`: presentation tree, directive parsing, binding compiler
//! - `vm`: the view model that owns data, methods, and bindings
//!
//! # Example
//!
//! ```rust,ignore
//! use mvvm_core::reactive::{observe, Watcher};
//! use serde_json::json;
//!
//! let model = observe(json!({ "count": 0 }));
//! let model = model.as_object().unwrap();
//!
//! let _watcher = Watcher::new(model, "count", |value, _| {
//!     println!("Count: {value}");
//!     Ok(())
//! })?;
//!
//! model.set("count", 0)?; // unchanged, nothing runs
//! model.set("count", 5)?; // prints "Count: 5"
//! ```

pub mod error;
pub mod reactive;
pub mod view;
pub mod vm;

pub use error::{BindError, Result};
pub use reactive::{observe, Object, Value, Watcher};
pub use view::{Event, Node};
pub use vm::{MountConfig, ViewModel, ViewModelBuilder};
