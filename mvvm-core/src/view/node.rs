//! Presentation tree.
//!
//! A small in-memory tree of elements and text nodes: enough surface for the
//! compiler to find bindings, push values in, and receive input events back.
//! Nodes are shared handles; a reaction holding a clone updates the same node
//! the tree shows.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::error::Result;

/// Callback run when an event is dispatched on a node.
pub type Listener = Arc<dyn Fn(&Event) -> Result<()> + Send + Sync>;

/// An event delivered to node listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub name: String,
    /// Value of the target element at dispatch time, for input events.
    pub value: Option<String>,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    /// An `input` event carrying the element's new value.
    pub fn input(value: impl Into<String>) -> Self {
        Self {
            name: "input".to_string(),
            value: Some(value.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Text,
}

/// A handle to a node of the presentation tree.
#[derive(Clone)]
pub struct Node {
    inner: Arc<RwLock<NodeData>>,
}

struct NodeData {
    kind: NodeKind,
    /// Lowercased tag name; empty for text nodes.
    tag: String,
    attributes: IndexMap<String, String>,
    /// Content of a text node.
    text: String,
    /// Current value of a form element.
    value: String,
    children: Vec<Node>,
    listeners: IndexMap<String, SmallVec<[Listener; 2]>>,
}

impl Node {
    fn with_data(kind: NodeKind, tag: String, text: String) -> Self {
        Self {
            inner: Arc::new(RwLock::new(NodeData {
                kind,
                tag,
                attributes: IndexMap::new(),
                text,
                value: String::new(),
                children: Vec::new(),
                listeners: IndexMap::new(),
            })),
        }
    }

    pub fn element(tag: &str) -> Self {
        Self::with_data(NodeKind::Element, tag.to_ascii_lowercase(), String::new())
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::with_data(NodeKind::Text, String::new(), content.into())
    }

    /// Builder form of [`set_attribute`](Self::set_attribute).
    pub fn with_attr(self, name: &str, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Builder form of [`append_child`](Self::append_child).
    pub fn with_child(self, child: Node) -> Self {
        self.append_child(child);
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.inner.read().kind
    }

    pub fn is_element(&self) -> bool {
        self.kind() == NodeKind::Element
    }

    pub fn is_text(&self) -> bool {
        self.kind() == NodeKind::Text
    }

    pub fn tag(&self) -> String {
        self.inner.read().tag.clone()
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.inner.read().attributes.get(name).cloned()
    }

    pub fn set_attribute(&self, name: &str, value: impl Into<String>) {
        self.inner
            .write()
            .attributes
            .insert(name.to_string(), value.into());
    }

    /// Attributes in declaration order.
    pub fn attributes(&self) -> Vec<(String, String)> {
        self.inner
            .read()
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn append_child(&self, child: Node) {
        self.inner.write().children.push(child);
    }

    pub fn children(&self) -> Vec<Node> {
        self.inner.read().children.clone()
    }

    pub fn has_children(&self) -> bool {
        !self.inner.read().children.is_empty()
    }

    /// Concatenated text of this node and its descendants.
    pub fn text_content(&self) -> String {
        let data = self.inner.read();
        match data.kind {
            NodeKind::Text => data.text.clone(),
            NodeKind::Element => data.children.iter().map(Node::text_content).collect(),
        }
    }

    /// Replace the text. On an element, replaces all children with one text
    /// node.
    pub fn set_text_content(&self, content: impl Into<String>) {
        let mut data = self.inner.write();
        match data.kind {
            NodeKind::Text => data.text = content.into(),
            NodeKind::Element => data.children = vec![Node::text(content)],
        }
    }

    /// Inner markup of an element. Markup is stored verbatim, not parsed.
    pub fn inner_html(&self) -> String {
        self.text_content()
    }

    pub fn set_inner_html(&self, markup: impl Into<String>) {
        self.set_text_content(markup);
    }

    /// Current value of a form element.
    pub fn value(&self) -> String {
        self.inner.read().value.clone()
    }

    pub fn set_value(&self, value: impl Into<String>) {
        self.inner.write().value = value.into();
    }

    pub fn add_event_listener<F>(&self, event: &str, listener: F)
    where
        F: Fn(&Event) -> Result<()> + Send + Sync + 'static,
    {
        self.inner
            .write()
            .listeners
            .entry(event.to_string())
            .or_default()
            .push(Arc::new(listener));
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.inner
            .read()
            .listeners
            .get(event)
            .map_or(0, |listeners| listeners.len())
    }

    /// Run the listeners for `event.name` in registration order.
    ///
    /// Stops at the first listener that fails.
    pub fn dispatch(&self, event: &Event) -> Result<()> {
        let listeners = self
            .inner
            .read()
            .listeners
            .get(&event.name)
            .cloned()
            .unwrap_or_default();

        for listener in &listeners {
            listener(event)?;
        }
        Ok(())
    }

    /// Simulate the user typing: set the value, then fire `input`.
    pub fn input(&self, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        self.set_value(value.clone());
        self.dispatch(&Event::input(value))
    }

    /// First descendant matching `selector`, depth first.
    ///
    /// Supports `#id` and bare tag names.
    pub fn query(&self, selector: &str) -> Option<Node> {
        let selector = selector.trim();
        for child in self.children() {
            if child.matches(selector) {
                return Some(child);
            }
            if let Some(found) = child.query(selector) {
                return Some(found);
            }
        }
        None
    }

    fn matches(&self, selector: &str) -> bool {
        if !self.is_element() {
            return false;
        }
        match selector.strip_prefix('#') {
            Some(id) => self.attribute("id").as_deref() == Some(id),
            None => self.tag().eq_ignore_ascii_case(selector),
        }
    }

    /// Whether two handles refer to the same node.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.inner.read();
        match data.kind {
            NodeKind::Text => f.debug_tuple("Text").field(&data.text).finish(),
            NodeKind::Element => f
                .debug_struct("Element")
                .field("tag", &data.tag)
                .field("attributes", &data.attributes)
                .field("children", &data.children)
                .finish(),
        }
    }
}
