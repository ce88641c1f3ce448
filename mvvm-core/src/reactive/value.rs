//! Model Values
//!
//! [`Value`] is what a tracked field stores. Scalars and arrays are plain
//! data; mappings are [`Object`]s, whose keys are tracked fields installed
//! once when the object is built.
//!
//! # Equality
//!
//! The write short-circuit and the watcher cache both compare with
//! `PartialEq`. Scalars and arrays compare structurally, `Int` and `Float`
//! compare numerically, and objects compare by identity: two distinct
//! objects are never equal, even with identical contents.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use tracing::{trace, warn};

use super::observer::{self, Field};
use super::path::FieldPath;
use crate::error::{BindError, Result};

/// Counter for generating unique object IDs.
static OBJECT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A value held by a model field.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(Object),
}

impl Value {
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether a binding should render this value rather than blank it.
    ///
    /// Null, `false`, zero, NaN and the empty string are falsy; everything
    /// else, including empty arrays and objects, is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    /// Text used when a value is pushed into the presentation tree.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => format_float(*f),
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::Null => String::new(),
                    other => other.to_display_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_string(),
        }
    }

    /// Take a plain, untracked snapshot of this value.
    ///
    /// An object reached again through its own fields is written as `null`.
    pub fn to_json(&self) -> serde_json::Value {
        self.snapshot(&mut Vec::new())
    }

    /// `ancestors` holds the ids of the objects being snapshotted above this
    /// value.
    fn snapshot(&self, ancestors: &mut Vec<u64>) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => serde_json::Value::Array(
                items.iter().map(|item| item.snapshot(ancestors)).collect(),
            ),
            Value::Object(object) => object.snapshot(ancestors),
        }
    }
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        let sign = if f > 0.0 { "" } else { "-" };
        format!("{sign}Infinity")
    } else if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        format!("{f}")
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                int_eq_float(*a, *b)
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

/// Exact comparison: `a as f64` would round large integers.
fn int_eq_float(a: i64, b: f64) -> bool {
    // 2^63 is exactly representable; every integral float in
    // [-2^63, 2^63) fits in an i64.
    const BOUND: f64 = 9_223_372_036_854_775_808.0;
    b.fract() == 0.0 && (-BOUND..BOUND).contains(&b) && b as i64 == a
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        observer::observe(value)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

// ----------------------------------------------------------------------------
// Object
// ----------------------------------------------------------------------------

/// A tracked mapping.
///
/// Cloning an `Object` clones the handle, not the data. The set of tracked
/// keys is fixed when the object is built; keys inserted afterwards are
/// stored as plain entries that never subscribe or notify.
///
/// An object stored inside itself is a strong cycle and is never freed.
/// Snapshots cut the cycle and write the inner reference as `null`.
#[derive(Clone)]
pub struct Object {
    inner: Arc<ObjectInner>,
}

struct ObjectInner {
    /// Unique identifier for this object.
    id: u64,

    /// Tracked fields, in insertion order.
    fields: IndexMap<String, Field>,

    /// Keys added after construction. Never tracked.
    extras: RwLock<IndexMap<String, Value>>,
}

/// Non-owning handle to an [`Object`].
#[derive(Clone)]
pub struct WeakObject {
    inner: Weak<ObjectInner>,
}

impl Object {
    /// Build an object whose entries are all tracked fields.
    ///
    /// Values that are already objects are kept as they are; use
    /// [`observe`](super::observe) to build a model from JSON.
    pub fn new<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let fields = entries
            .into_iter()
            .map(|(key, value)| {
                let key = key.into();
                let field = observer::define_field(key.clone(), value);
                (key, field)
            })
            .collect();
        Self::from_fields(fields)
    }

    pub(crate) fn from_fields(fields: IndexMap<String, Field>) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                id: OBJECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
                fields,
                extras: RwLock::new(IndexMap::new()),
            }),
        }
    }

    /// Get the object's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Read a key. Tracked keys register the evaluating watcher, if any.
    ///
    /// Missing keys read as `Value::Null`.
    pub fn get(&self, key: &str) -> Value {
        match self.inner.fields.get(key) {
            Some(field) => field.get(),
            None => self.peek_extra(key),
        }
    }

    /// Read a key without registering any watcher.
    pub fn peek(&self, key: &str) -> Value {
        match self.inner.fields.get(key) {
            Some(field) => field.peek(),
            None => self.peek_extra(key),
        }
    }

    fn peek_extra(&self, key: &str) -> Value {
        self.inner.extras.read().get(key).cloned().unwrap_or_default()
    }

    /// Write a key.
    ///
    /// Returns whether the stored value changed. Writing an untracked key
    /// stores it silently.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<bool> {
        let value = value.into();
        if let Some(field) = self.inner.fields.get(key) {
            return field.set(value);
        }

        trace!(object = self.inner.id, key, "write to untracked key");
        let mut extras = self.inner.extras.write();
        let changed = extras.get(key) != Some(&value);
        extras.insert(key.to_string(), value);
        Ok(changed)
    }

    /// The tracked field behind `key`, if the key was present at construction.
    pub fn field(&self, key: &str) -> Option<Field> {
        self.inner.fields.get(key).cloned()
    }

    pub fn is_tracked(&self, key: &str) -> bool {
        self.inner.fields.contains_key(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.is_tracked(key) || self.inner.extras.read().contains_key(key)
    }

    /// All keys: tracked ones first, in construction order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.fields.keys().cloned().collect();
        keys.extend(self.inner.extras.read().keys().cloned());
        keys
    }

    pub fn len(&self) -> usize {
        self.inner.fields.len() + self.inner.extras.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read a path, tracking every segment along the way.
    ///
    /// Resolves to `Value::Null` if an intermediate segment is not an object.
    pub fn get_path(&self, path: &FieldPath) -> Value {
        let mut current = self.clone();
        for segment in path.parent() {
            match current.get(segment) {
                Value::Object(next) => current = next,
                _ => return Value::Null,
            }
        }
        current.get(path.last())
    }

    /// Read a path without tracking.
    pub fn peek_path(&self, path: &FieldPath) -> Value {
        let mut current = self.clone();
        for segment in path.parent() {
            match current.peek(segment) {
                Value::Object(next) => current = next,
                _ => return Value::Null,
            }
        }
        current.peek(path.last())
    }

    /// Write the last segment of a path.
    pub fn set_path(&self, path: &FieldPath, value: impl Into<Value>) -> Result<bool> {
        let mut current = self.clone();
        for (depth, segment) in path.parent().iter().enumerate() {
            match current.peek(segment) {
                Value::Object(next) => current = next,
                _ => {
                    return Err(BindError::NotAnObject {
                        path: path.segments()[..=depth].join("."),
                    })
                }
            }
        }
        current.set(path.last(), value)
    }

    /// Take a plain, untracked snapshot.
    ///
    /// An object reached again through its own fields is written as `null`.
    pub fn to_json(&self) -> serde_json::Value {
        self.snapshot(&mut Vec::new())
    }

    fn snapshot(&self, ancestors: &mut Vec<u64>) -> serde_json::Value {
        if ancestors.contains(&self.inner.id) {
            warn!(object = self.inner.id, "self-referencing object in snapshot");
            return serde_json::Value::Null;
        }
        ancestors.push(self.inner.id);

        let mut map = serde_json::Map::new();
        for (key, field) in &self.inner.fields {
            map.insert(key.clone(), field.peek().snapshot(ancestors));
        }
        let extras: Vec<(String, Value)> = self
            .inner
            .extras
            .read()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        for (key, value) in extras {
            map.insert(key, value.snapshot(ancestors));
        }

        ancestors.pop();
        serde_json::Value::Object(map)
    }

    /// Whether two handles refer to the same object.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakObject {
        WeakObject {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.inner.id)
            .field("keys", &self.keys())
            .finish()
    }
}

impl WeakObject {
    pub fn upgrade(&self) -> Option<Object> {
        self.inner.upgrade().map(|inner| Object { inner })
    }
}

impl fmt::Debug for WeakObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakObject")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_equality_crosses_int_and_float() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Int(1), Value::Float(1.5));
        assert_ne!(Value::Float(f64::NAN), Value::Float(f64::NAN));
    }

    #[test]
    fn large_int_float_equality_is_exact() {
        // 2^53 + 1 has no f64 form; the nearest float is 2^53.
        assert_ne!(Value::Int(9_007_199_254_740_993), Value::Float(9_007_199_254_740_992.0));
        assert_eq!(Value::Int(9_007_199_254_740_992), Value::Float(9_007_199_254_740_992.0));
        assert_eq!(Value::Int(i64::MIN), Value::Float(-9_223_372_036_854_775_808.0));
        assert_ne!(Value::Int(i64::MAX), Value::Float(9_223_372_036_854_775_808.0));
        assert_ne!(Value::Int(0), Value::Float(f64::INFINITY));
    }

    #[test]
    fn large_int_write_over_nearby_float_notifies() {
        let object = Object::new([("n", Value::Float(9_007_199_254_740_992.0))]);
        assert!(object.set("n", Value::Int(9_007_199_254_740_993)).unwrap());
        assert_eq!(object.peek("n"), Value::Int(9_007_199_254_740_993));
    }

    #[test]
    fn objects_compare_by_identity() {
        let a = Object::new([("x", Value::Int(1))]);
        let b = Object::new([("x", Value::Int(1))]);
        assert_eq!(Value::Object(a.clone()), Value::Object(a.clone()));
        assert_ne!(Value::Object(a), Value::Object(b));
    }

    #[test]
    fn truthiness_matches_binding_rules() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::Float(f64::NAN).is_truthy());
        assert!(Value::from("0").is_truthy());
        assert!(Value::Array(vec![]).is_truthy());
    }

    #[test]
    fn display_strings() {
        assert_eq!(Value::Float(2.0).to_display_string(), "2");
        assert_eq!(Value::Float(1.5).to_display_string(), "1.5");
        assert_eq!(
            Value::Array(vec![Value::Int(1), Value::Null, Value::from("a")]).to_display_string(),
            "1,,a"
        );
    }

    #[test]
    fn untracked_keys_are_stored_plainly() {
        let object = Object::new([("a", Value::Int(1))]);
        assert!(!object.is_tracked("b"));

        assert!(object.set("b", 2).unwrap());
        assert!(!object.set("b", 2).unwrap());
        assert_eq!(object.get("b"), Value::Int(2));
        assert!(object.contains_key("b"));
        assert!(object.field("b").is_none());
        assert_eq!(object.keys(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn missing_key_reads_null() {
        let object = Object::new(Vec::<(String, Value)>::new());
        assert!(object.get("nope").is_null());
        assert!(object.is_empty());
    }

    #[test]
    fn set_path_through_scalar_fails() {
        let model = Value::from(json!({ "a": 1 }));
        let object = model.as_object().unwrap();
        let path = FieldPath::parse("a.b").unwrap();

        assert!(object.get_path(&path).is_null());
        assert!(matches!(
            object.set_path(&path, 2),
            Err(BindError::NotAnObject { path }) if path == "a"
        ));
    }

    #[test]
    fn snapshot_round_trips_to_json() {
        let data = json!({ "a": { "b": [1, 2.5, "x"] }, "c": null });
        let model = Value::from(data.clone());
        assert_eq!(model.to_json(), data);
        assert_eq!(serde_json::to_value(&model).unwrap(), data);
    }

    #[test]
    fn self_reference_snapshots_as_null() {
        let object = Object::new([("a", Value::Int(1))]);
        object.set("me", object.clone()).unwrap();

        assert_eq!(object.to_json(), json!({ "a": 1, "me": null }));
        assert_eq!(
            serde_json::to_value(Value::Object(object.clone())).unwrap(),
            json!({ "a": 1, "me": null })
        );

        // Break the cycle so the object can be freed.
        object.set("me", Value::Null).unwrap();
    }

    #[test]
    fn shared_object_is_snapshotted_at_each_position() {
        let shared = Object::new([("x", Value::Int(1))]);
        let object = Object::new([
            ("left", Value::Object(shared.clone())),
            ("right", Value::Object(shared)),
        ]);
        assert_eq!(
            object.to_json(),
            json!({ "left": { "x": 1 }, "right": { "x": 1 } })
        );
    }
}
