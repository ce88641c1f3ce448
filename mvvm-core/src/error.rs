//! Error types for the binding engine.

use thiserror::Error;

/// Errors raised while building a model, installing bindings, or
/// propagating a change.
#[derive(Debug, Error)]
pub enum BindError {
    /// The mount selector matched nothing in the presentation tree.
    #[error("no element matches selector `{selector}`")]
    MissingTarget { selector: String },

    /// A path segment resolved to something other than a tracked mapping.
    #[error("`{path}` does not resolve to an object")]
    NotAnObject { path: String },

    /// A field path could not be parsed.
    #[error("invalid field path `{path}`")]
    InvalidPath { path: String },

    /// A reaction wrote into a field whose fan-out is already running.
    #[error("write to `{field}` re-entered its own notification")]
    Cycle { field: String },

    /// Nested fan-out passes went deeper than the configured limit.
    #[error("notification depth exceeded ({depth})")]
    DepthExceeded { depth: usize },

    /// An event directive or `call` named a method the view model lacks.
    #[error("no method named `{name}`")]
    MissingMethod { name: String },

    /// A reaction or method reported a failure.
    #[error("reaction failed: {message}")]
    Reaction { message: String },

    /// One or more isolated reactions failed during a single fan-out.
    #[error("{} reaction(s) failed during notify", .failures.len())]
    Propagation { failures: Vec<BindError> },

    /// Configuration could not be decoded.
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl BindError {
    /// Build a [`BindError::Reaction`] from any message.
    pub fn reaction(message: impl Into<String>) -> Self {
        Self::Reaction {
            message: message.into(),
        }
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, BindError>;
