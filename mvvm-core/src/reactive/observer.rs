//! Observer
//!
//! Turns plain data into a tracked model. Every key of every mapping becomes
//! a [`Field`]: a storage cell whose reads register the evaluating watcher
//! and whose writes notify the watchers registered so far.
//!
//! # Wrapping Order
//!
//! Nested mappings are wrapped before the key that holds them, so an object
//! is fully reactive by the time its parent field exists. Scalars and arrays
//! are wrapped at the leaf; array elements are not tracked individually.
//!
//! Wrapping happens once, when the model is built. Keys added to an
//! [`Object`] later are plain entries.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::trace;

use super::dep::Dep;
use super::value::{Object, Value};
use crate::error::Result;

/// Build a model from plain data.
///
/// A mapping becomes a tracked [`Object`]. Any other root is converted to a
/// plain [`Value`] with nothing to track.
pub fn observe(data: serde_json::Value) -> Value {
    match data {
        serde_json::Value::Object(map) => Value::Object(observe_map(map)),
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => {
            Value::Array(items.into_iter().map(observe).collect())
        }
    }
}

/// Wrap every key of a mapping.
pub fn observe_map(map: serde_json::Map<String, serde_json::Value>) -> Object {
    let fields: IndexMap<String, Field> = map
        .into_iter()
        .map(|(key, raw)| {
            // Recurse first: nested objects are tracked before their parent.
            let value = observe(raw);
            let field = define_field(key.clone(), value);
            (key, field)
        })
        .collect();
    Object::from_fields(fields)
}

pub(crate) fn define_field(key: String, value: Value) -> Field {
    trace!(key = %key, "define field");
    Field::new(key, value)
}

/// A tracked storage cell.
///
/// `Field` is a handle; clones share the same value and subscriber set.
#[derive(Clone)]
pub struct Field {
    inner: Arc<FieldInner>,
}

struct FieldInner {
    key: String,
    value: RwLock<Value>,
    dep: Dep,
}

impl Field {
    fn new(key: String, value: Value) -> Self {
        let dep = Dep::new(key.clone());
        Self {
            inner: Arc::new(FieldInner {
                key,
                value: RwLock::new(value),
                dep,
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Read the value, registering the evaluating watcher if there is one.
    pub fn get(&self) -> Value {
        self.inner.dep.depend();
        self.peek()
    }

    /// Read the value without registering anything.
    pub fn peek(&self) -> Value {
        self.inner.value.read().clone()
    }

    /// Store a new value and notify subscribers.
    ///
    /// Writing a value equal to the stored one is a no-op and returns
    /// `Ok(false)`. A write that would re-enter this field's running fan-out,
    /// or nest past the depth limit, is rejected before anything is stored.
    /// Reaction errors come from the fan-out, after the value has been stored.
    pub fn set(&self, value: Value) -> Result<bool> {
        let pass = {
            let mut guard = self.inner.value.write();
            if *guard == value {
                return Ok(false);
            }
            let pass = self.inner.dep.begin_notify()?;
            *guard = value;
            pass
        };

        if let Some(pass) = pass {
            pass.run()?;
        }
        Ok(true)
    }

    /// The subscriber set owned by this field.
    pub fn dep(&self) -> &Dep {
        &self.inner.dep
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.dep.watcher_count()
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("key", &self.inner.key)
            .field("value", &self.peek())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn non_mapping_root_is_not_wrapped() {
        assert_eq!(observe(json!(5)), Value::Int(5));
        assert_eq!(observe(json!("x")), Value::from("x"));
        assert!(observe(json!(null)).is_null());
    }

    #[test]
    fn nested_mappings_are_wrapped_at_every_depth() {
        let model = observe(json!({ "a": { "b": { "c": 1 } } }));
        let a = model.as_object().unwrap().peek("a");
        let b = a.as_object().unwrap().peek("b");
        let b = b.as_object().unwrap();

        assert!(b.is_tracked("c"));
        assert_eq!(b.peek("c"), Value::Int(1));
    }

    #[test]
    fn key_order_is_preserved() {
        let model = observe(json!({ "z": 1, "a": 2, "m": 3 }));
        assert_eq!(model.as_object().unwrap().keys(), ["z", "a", "m"]);
    }

    #[test]
    fn field_write_short_circuits_on_equal_value() {
        let field = define_field("count".into(), Value::Int(0));
        assert!(!field.set(Value::Int(0)).unwrap());
        assert!(field.set(Value::Int(5)).unwrap());
        assert_eq!(field.peek(), Value::Int(5));
        assert!(!field.set(Value::Float(5.0)).unwrap());
    }

    #[test]
    fn rejected_write_leaves_value_untouched() {
        use crate::reactive::{Object, Runtime, Watcher};

        let model = Object::new([("count", Value::Int(0))]);
        let _watcher = Watcher::new(&model, "count", |_, _| Ok(())).unwrap();
        let field = model.field("count").unwrap();

        let _running = Runtime::enter_notify(field.dep()).unwrap();
        assert!(field.set(Value::Int(9)).is_err());
        assert_eq!(field.peek(), Value::Int(0));
    }

    #[test]
    fn read_outside_evaluation_subscribes_nothing() {
        let field = define_field("count".into(), Value::Int(0));
        assert_eq!(field.get(), Value::Int(0));
        assert_eq!(field.subscriber_count(), 0);
    }
}
