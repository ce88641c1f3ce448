//! View Layer
//!
//! The collaborators around the reactive core: a presentation tree, the
//! directive syntax that marks bindings in it, and the compiler that turns
//! each binding into a watcher.

mod compiler;
mod directive;
mod node;

pub use compiler::{render_value, Compiler};
pub use directive::{accepts_model, parse_interpolation, Directive};
pub use node::{Event, Listener, Node, NodeKind};
