//! View Model
//!
//! A [`ViewModel`] ties the pieces together: it observes its data, compiles
//! the bindings found under its mount target, and exposes the data keys and
//! named methods to event handlers.
//!
//! # Example
//!
//! ```rust,ignore
//! let document = Node::element("html").with_child(
//!     Node::element("div")
//!         .with_attr("id", "app")
//!         .with_child(Node::text("{{ count }}"))
//!         .with_child(Node::element("button").with_attr("v-on:click", "increment")),
//! );
//!
//! let vm = ViewModel::builder()
//!     .el("#app")
//!     .data(json!({ "count": 0 }))
//!     .method("increment", |vm, _| {
//!         let next = vm.get("count").as_i64().unwrap_or(0) + 1;
//!         vm.set("count", next)?;
//!         Ok(())
//!     })
//!     .mount(&document)?;
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BindError, Result};
use crate::reactive::{observe, FieldPath, Object, Value, Watcher};
use crate::view::{Compiler, Event, Node};

/// A named handler callable from event directives.
pub type Method = Arc<dyn Fn(&ViewModel, &Event) -> Result<()> + Send + Sync>;

type MountedHook = Arc<dyn Fn(&ViewModel) -> Result<()> + Send + Sync>;

/// The serializable part of a view model's options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Mount selector: `#id` or a tag name.
    pub el: String,
    #[serde(default = "empty_data")]
    pub data: serde_json::Value,
}

fn empty_data() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl MountConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Builder for [`ViewModel`].
pub struct ViewModelBuilder {
    el: String,
    data: serde_json::Value,
    methods: IndexMap<String, Method>,
    mounted: Option<MountedHook>,
}

impl ViewModelBuilder {
    fn new() -> Self {
        Self {
            el: String::new(),
            data: empty_data(),
            methods: IndexMap::new(),
            mounted: None,
        }
    }

    pub fn from_config(config: MountConfig) -> Self {
        Self::new().el(config.el).data(config.data)
    }

    pub fn el(mut self, selector: impl Into<String>) -> Self {
        self.el = selector.into();
        self
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn method<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&ViewModel, &Event) -> Result<()> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(handler));
        self
    }

    /// Hook run once, after bindings are installed.
    pub fn mounted<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ViewModel) -> Result<()> + Send + Sync + 'static,
    {
        self.mounted = Some(Arc::new(hook));
        self
    }

    /// Observe the data without mounting anything.
    pub fn build(self) -> Result<ViewModel> {
        self.into_parts().map(|(vm, _)| vm)
    }

    fn into_parts(self) -> Result<(ViewModel, Option<MountedHook>)> {
        let data = match observe(self.data) {
            Value::Object(object) => object,
            _ => {
                return Err(BindError::NotAnObject {
                    path: "data".to_string(),
                })
            }
        };

        let vm = ViewModel {
            inner: Arc::new(ViewModelInner {
                el: self.el,
                data,
                methods: self.methods,
                bindings: Mutex::new(Vec::new()),
            }),
        };
        Ok((vm, self.mounted))
    }

    /// Observe the data, compile the subtree under `el`, then run the
    /// mounted hook.
    ///
    /// Fails with [`BindError::MissingTarget`] if `el` matches nothing under
    /// `root`.
    pub fn mount(self, root: &Node) -> Result<ViewModel> {
        let (vm, mounted) = self.into_parts()?;
        let target = Compiler::resolve(root, &vm.inner.el)?;

        let watchers = Compiler::new(&vm).compile(&target)?;
        vm.inner.bindings.lock().extend(watchers);
        debug!(el = %vm.inner.el, bindings = vm.binding_count(), "view model mounted");

        if let Some(hook) = mounted {
            hook(&vm)?;
        }
        Ok(vm)
    }
}

/// A mounted (or built) view model. Cheap to clone.
#[derive(Clone)]
pub struct ViewModel {
    inner: Arc<ViewModelInner>,
}

struct ViewModelInner {
    el: String,
    data: Object,
    methods: IndexMap<String, Method>,
    bindings: Mutex<Vec<Watcher>>,
}

/// Non-owning handle to a [`ViewModel`], held by event listeners.
#[derive(Clone)]
pub struct WeakViewModel {
    inner: Weak<ViewModelInner>,
}

impl ViewModel {
    pub fn builder() -> ViewModelBuilder {
        ViewModelBuilder::new()
    }

    /// The observed data root.
    pub fn data(&self) -> Object {
        self.inner.data.clone()
    }

    pub fn el(&self) -> &str {
        &self.inner.el
    }

    /// Read a data key (tracked).
    pub fn get(&self, key: &str) -> Value {
        self.inner.data.get(key)
    }

    /// Write a data key. Returns whether the value changed.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<bool> {
        self.inner.data.set(key, value)
    }

    /// Read a dotted path (tracked).
    pub fn get_path(&self, path: &str) -> Result<Value> {
        let path = FieldPath::parse(path)?;
        Ok(self.inner.data.get_path(&path))
    }

    /// Write a dotted path.
    pub fn set_path(&self, path: &str, value: impl Into<Value>) -> Result<bool> {
        let path = FieldPath::parse(path)?;
        self.inner.data.set_path(&path, value)
    }

    pub fn method(&self, name: &str) -> Option<Method> {
        self.inner.methods.get(name).cloned()
    }

    /// Invoke a named method.
    pub fn call(&self, name: &str, event: &Event) -> Result<()> {
        let method = self.method(name).ok_or_else(|| BindError::MissingMethod {
            name: name.to_string(),
        })?;
        method(self, event)
    }

    /// Watchers installed by mounting.
    pub fn bindings(&self) -> Vec<Watcher> {
        self.inner.bindings.lock().clone()
    }

    pub fn binding_count(&self) -> usize {
        self.inner.bindings.lock().len()
    }

    /// Tear down every installed binding.
    pub fn unmount(&self) {
        let bindings = std::mem::take(&mut *self.inner.bindings.lock());
        for watcher in &bindings {
            watcher.teardown();
        }
        debug!(el = %self.inner.el, released = bindings.len(), "view model unmounted");
    }

    pub fn downgrade(&self) -> WeakViewModel {
        WeakViewModel {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl WeakViewModel {
    pub fn upgrade(&self) -> Option<ViewModel> {
        self.inner.upgrade().map(|inner| ViewModel { inner })
    }
}

impl fmt::Debug for ViewModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewModel")
            .field("el", &self.inner.el)
            .field("data", &self.inner.data)
            .field("methods", &self.inner.methods.keys().collect::<Vec<_>>())
            .field("bindings", &self.binding_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mount_config_from_json() {
        let config = MountConfig::from_json(r##"{ "el": "#app" }"##).unwrap();
        assert_eq!(config.el, "#app");
        assert_eq!(config.data, json!({}));

        assert!(MountConfig::from_json("{}").is_err());
    }

    #[test]
    fn build_rejects_non_object_data() {
        let result = ViewModel::builder().data(json!([1, 2])).build();
        assert!(matches!(result, Err(BindError::NotAnObject { .. })));
    }

    #[test]
    fn keys_proxy_to_data() {
        let vm = ViewModel::builder()
            .data(json!({ "count": 1, "user": { "name": "ada" } }))
            .build()
            .unwrap();

        assert_eq!(vm.get("count"), Value::Int(1));
        assert!(vm.set("count", 2).unwrap());
        assert_eq!(vm.data().peek("count"), Value::Int(2));

        assert_eq!(vm.get_path("user.name").unwrap(), Value::from("ada"));
        vm.set_path("user.name", "grace").unwrap();
        assert_eq!(vm.get_path("user.name").unwrap(), Value::from("grace"));
    }

    #[test]
    fn call_unknown_method_fails() {
        let vm = ViewModel::builder().build().unwrap();
        assert!(matches!(
            vm.call("nope", &Event::new("click")),
            Err(BindError::MissingMethod { name }) if name == "nope"
        ));
    }

    #[test]
    fn mount_missing_target_is_fatal() {
        let root = Node::element("body");
        let result = ViewModel::builder().el("#app").mount(&root);
        assert!(matches!(result, Err(BindError::MissingTarget { .. })));
    }

    #[test]
    fn weak_handle_does_not_keep_vm_alive() {
        let vm = ViewModel::builder().build().unwrap();
        let weak = vm.downgrade();
        assert!(weak.upgrade().is_some());
        drop(vm);
        assert!(weak.upgrade().is_none());
    }
}
