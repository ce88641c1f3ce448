//! Binding directives.
//!
//! Recognized forms:
//!
//! - `{{ exp }}` inside a text node: render `exp` as the node's text.
//! - `v-text="exp"`: render `exp` as the element's inner markup.
//! - `v-model="exp"`: two-way binding on `input` and `textarea`.
//! - `<prefix>:<event>="method"`: call a view-model method on `event`.

/// A binding parsed from an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Text { expression: String },
    Model { expression: String },
    On { event: String, method: String },
}

impl Directive {
    /// Parse one attribute. Returns `None` for plain attributes.
    pub fn parse_attribute(name: &str, value: &str) -> Option<Self> {
        if name == "v-model" {
            Some(Directive::Model {
                expression: value.trim().to_string(),
            })
        } else if let Some((_, event)) = name.split_once(':') {
            let event = event.split(':').next().unwrap_or_default();
            Some(Directive::On {
                event: event.to_string(),
                method: value.trim().to_string(),
            })
        } else if name == "v-text" {
            Some(Directive::Text {
                expression: value.trim().to_string(),
            })
        } else {
            None
        }
    }
}

/// Extract the expression of a `{{ ... }}` interpolation.
///
/// The match is greedy: it spans from the first `{{` to the last `}}`.
/// Returns `None` when there is no interpolation or it is blank.
pub fn parse_interpolation(text: &str) -> Option<String> {
    let start = text.find("{{")? + 2;
    let end = text[start..].rfind("}}")? + start;
    let expression = text[start..end].trim();
    if expression.is_empty() {
        None
    } else {
        Some(expression.to_string())
    }
}

/// Whether `v-model` applies to elements with this tag.
pub fn accepts_model(tag: &str) -> bool {
    tag.eq_ignore_ascii_case("input") || tag.eq_ignore_ascii_case("textarea")
}
