//! Binding installer.
//!
//! Walks a presentation subtree, parses directives, and installs one
//! [`Watcher`] per binding. Input events on `v-model` elements are written
//! back into the model through the ordinary tracked write path.

use tracing::{debug, trace};

use super::directive::{accepts_model, parse_interpolation, Directive};
use super::node::Node;
use crate::error::{BindError, Result};
use crate::reactive::{FieldPath, Value, Watcher};
use crate::vm::ViewModel;

/// Text pushed into the tree for a bound value. Falsy values render blank.
pub fn render_value(value: &Value) -> String {
    if value.is_truthy() {
        value.to_display_string()
    } else {
        String::new()
    }
}

/// Compiles bindings for one view model.
pub struct Compiler {
    vm: ViewModel,
}

impl Compiler {
    pub fn new(vm: &ViewModel) -> Self {
        Self { vm: vm.clone() }
    }

    /// Find the mount target for `selector` under `root`.
    pub fn resolve(root: &Node, selector: &str) -> Result<Node> {
        root.query(selector).ok_or_else(|| BindError::MissingTarget {
            selector: selector.to_string(),
        })
    }

    /// Install bindings for every descendant of `el`.
    ///
    /// Returns the watchers created, in tree order.
    pub fn compile(&self, el: &Node) -> Result<Vec<Watcher>> {
        let mut watchers = Vec::new();
        self.compile_children(el, &mut watchers)?;
        debug!(bindings = watchers.len(), "compiled subtree");
        Ok(watchers)
    }

    fn compile_children(&self, node: &Node, out: &mut Vec<Watcher>) -> Result<()> {
        for child in node.children() {
            if child.is_element() {
                self.compile_element(&child, out)?;
            } else if let Some(expression) = parse_interpolation(&child.text_content()) {
                self.compile_text(&child, &expression, out)?;
            }

            if child.has_children() {
                self.compile_children(&child, out)?;
            }
        }
        Ok(())
    }

    fn compile_element(&self, node: &Node, out: &mut Vec<Watcher>) -> Result<()> {
        for (name, value) in node.attributes() {
            let Some(directive) = Directive::parse_attribute(&name, &value) else {
                continue;
            };

            match directive {
                Directive::Model { expression } => {
                    if accepts_model(&node.tag()) {
                        self.compile_model(node, &expression, out)?;
                    }
                }
                Directive::On { event, method } => self.compile_event(node, &event, &method),
                Directive::Text { expression } => {
                    let watcher = self.bind(node, &expression, |node, value| {
                        node.set_inner_html(render_value(value));
                    })?;
                    out.push(watcher);
                }
            }
        }
        Ok(())
    }

    fn compile_text(&self, node: &Node, expression: &str, out: &mut Vec<Watcher>) -> Result<()> {
        let watcher = self.bind(node, expression, |node, value| {
            node.set_text_content(render_value(value));
        })?;
        out.push(watcher);
        Ok(())
    }

    fn compile_model(&self, node: &Node, expression: &str, out: &mut Vec<Watcher>) -> Result<()> {
        let watcher = self.bind(node, expression, |node, value| {
            node.set_value(render_value(value));
        })?;
        out.push(watcher);

        let path = FieldPath::parse(expression)?;
        let vm = self.vm.downgrade();
        node.add_event_listener("input", move |event| {
            let Some(vm) = vm.upgrade() else {
                return Ok(());
            };
            let value = event.value.clone().unwrap_or_default();
            vm.data().set_path(&path, value)?;
            Ok(())
        });
        Ok(())
    }

    fn compile_event(&self, node: &Node, event: &str, method: &str) {
        if self.vm.method(method).is_none() {
            debug!(event, method, "no such method; listener skipped");
            return;
        }

        let vm = self.vm.downgrade();
        let method = method.to_string();
        node.add_event_listener(event, move |event| match vm.upgrade() {
            Some(vm) => vm.call(&method, event),
            None => Ok(()),
        });
    }

    /// Render `expression` into `node` now, and on every change.
    fn bind<R>(&self, node: &Node, expression: &str, render: R) -> Result<Watcher>
    where
        R: Fn(&Node, &Value) + Send + Sync + 'static,
    {
        let path = FieldPath::parse(expression)?;
        let data = self.vm.data();

        render(node, &data.peek_path(&path));

        let target = node.clone();
        let watcher = Watcher::with_path(&data, path, move |value, _| {
            render(&target, value);
            Ok(())
        });
        trace!(expression, watcher = ?watcher.id(), "binding installed");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn render_blanks_falsy_values() {
        assert_eq!(render_value(&Value::Int(0)), "");
        assert_eq!(render_value(&Value::Null), "");
        assert_eq!(render_value(&Value::Int(7)), "7");
        assert_eq!(render_value(&Value::from("x")), "x");
    }

    #[test]
    fn resolve_missing_target_fails() {
        let root = Node::element("body");
        assert!(matches!(
            Compiler::resolve(&root, "#app"),
            Err(BindError::MissingTarget { selector }) if selector == "#app"
        ));
    }

    #[test]
    fn compile_installs_text_binding() {
        let vm = ViewModel::builder()
            .data(json!({ "msg": "hello" }))
            .build()
            .unwrap();
        let text = Node::text("{{ msg }}");
        let el = Node::element("div").with_child(Node::element("p").with_child(text.clone()));

        let watchers = Compiler::new(&vm).compile(&el).unwrap();
        assert_eq!(watchers.len(), 1);
        assert_eq!(text.text_content(), "hello");

        vm.set("msg", "bye").unwrap();
        assert_eq!(text.text_content(), "bye");
    }

    #[test]
    fn model_on_non_form_element_is_ignored() {
        let vm = ViewModel::builder()
            .data(json!({ "name": "a" }))
            .build()
            .unwrap();
        let div = Node::element("div").with_attr("v-model", "name");
        let el = Node::element("section").with_child(div.clone());

        let watchers = Compiler::new(&vm).compile(&el).unwrap();
        assert!(watchers.is_empty());
        assert_eq!(div.listener_count("input"), 0);
    }

    #[test]
    fn unknown_method_registers_nothing() {
        let vm = ViewModel::builder().build().unwrap();
        let button = Node::element("button").with_attr("v-on:click", "missing");
        let el = Node::element("div").with_child(button.clone());

        Compiler::new(&vm).compile(&el).unwrap();
        assert_eq!(button.listener_count("click"), 0);
    }

    #[test]
    fn invalid_expression_fails_compile() {
        let vm = ViewModel::builder().build().unwrap();
        let el = Node::element("div").with_child(Node::element("span").with_attr("v-text", "a..b"));

        assert!(matches!(
            Compiler::new(&vm).compile(&el),
            Err(BindError::InvalidPath { .. })
        ));
    }
}
