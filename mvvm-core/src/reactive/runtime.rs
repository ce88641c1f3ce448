//! Reactive Runtime
//!
//! Per-thread configuration and bookkeeping for fan-out.
//!
//! # Write-during-notify
//!
//! A reaction may write back into the model, which starts a nested fan-out
//! on the same call stack. The runtime keeps the stack of subscriber sets
//! currently notifying on this thread and rejects two things:
//!
//! - re-entering the fan-out of a set that is already notifying (a cycle),
//! - nesting deeper than [`RuntimeConfig::max_notify_depth`].
//!
//! Idempotent writes never reach fan-out, so a reaction that writes back the
//! value a field already holds is not a cycle.

use std::cell::RefCell;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::context::ReactiveContext;
use super::dep::{Dep, DepId};
use super::watcher::Watcher;
use crate::error::{BindError, Result};

/// What a fan-out does when a reaction fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyPolicy {
    /// Stop at the first failing watcher and return its error.
    #[default]
    FailFast,
    /// Run every watcher, then report all failures together.
    Isolate,
}

/// Runtime settings, installed per thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub notify_policy: NotifyPolicy,
    /// Maximum number of nested fan-out passes on one call stack.
    pub max_notify_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            notify_policy: NotifyPolicy::FailFast,
            max_notify_depth: 64,
        }
    }
}

impl RuntimeConfig {
    /// Parse a config from JSON. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

thread_local! {
    static CONFIG: RefCell<RuntimeConfig> = RefCell::new(RuntimeConfig::default());
    static NOTIFYING: RefCell<Vec<DepId>> = const { RefCell::new(Vec::new()) };
}

/// Entry point for runtime-wide state.
pub struct Runtime;

impl Runtime {
    /// Install `config` for the current thread.
    pub fn configure(config: RuntimeConfig) {
        debug!(?config, "runtime configured");
        CONFIG.with(|slot| *slot.borrow_mut() = config);
    }

    /// The config active on the current thread.
    pub fn config() -> RuntimeConfig {
        CONFIG.with(|slot| slot.borrow().clone())
    }

    /// Get the watcher currently being tracked, if any.
    pub fn current_watcher() -> Option<Watcher> {
        ReactiveContext::current_watcher()
    }

    /// Check if a read right now would subscribe a watcher.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }

    /// Number of fan-out passes running on this thread.
    pub fn notify_depth() -> usize {
        NOTIFYING.with(|stack| stack.borrow().len())
    }

    pub(crate) fn enter_notify(dep: &Dep) -> Result<NotifyGuard> {
        let max_depth = Self::config().max_notify_depth;
        NOTIFYING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&dep.id()) {
                warn!(field = dep.label(), "write-during-notify cycle");
                return Err(BindError::Cycle {
                    field: dep.label().to_string(),
                });
            }
            if stack.len() >= max_depth {
                warn!(depth = stack.len(), "notification depth exceeded");
                return Err(BindError::DepthExceeded { depth: stack.len() });
            }
            stack.push(dep.id());
            Ok(NotifyGuard { dep: dep.id() })
        })
    }
}

/// Pops the notifying set when dropped.
pub(crate) struct NotifyGuard {
    dep: DepId,
}

impl Drop for NotifyGuard {
    fn drop(&mut self) {
        NOTIFYING.with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert_eq!(popped, Some(self.dep), "notify stack mismatch");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.notify_policy, NotifyPolicy::FailFast);
        assert_eq!(config.max_notify_depth, 64);
    }

    #[test]
    fn config_from_json_fills_defaults() {
        let config = RuntimeConfig::from_json(r#"{ "notify_policy": "isolate" }"#).unwrap();
        assert_eq!(config.notify_policy, NotifyPolicy::Isolate);
        assert_eq!(config.max_notify_depth, 64);

        assert!(matches!(
            RuntimeConfig::from_json(r#"{ "notify_policy": "sometimes" }"#),
            Err(BindError::Config(_))
        ));
    }

    #[test]
    fn configure_is_thread_local() {
        Runtime::configure(RuntimeConfig {
            notify_policy: NotifyPolicy::Isolate,
            max_notify_depth: 3,
        });
        assert_eq!(Runtime::config().max_notify_depth, 3);

        let other = std::thread::spawn(Runtime::config).join().unwrap();
        assert_eq!(other, RuntimeConfig::default());
    }

    #[test]
    fn notify_guard_detects_reentry() {
        let dep = Dep::new("count");
        let guard = Runtime::enter_notify(&dep).unwrap();
        assert_eq!(Runtime::notify_depth(), 1);

        assert!(matches!(
            Runtime::enter_notify(&dep),
            Err(BindError::Cycle { field }) if field == "count"
        ));

        drop(guard);
        assert_eq!(Runtime::notify_depth(), 0);
    }

    #[test]
    fn notify_guard_enforces_depth() {
        Runtime::configure(RuntimeConfig {
            max_notify_depth: 1,
            ..RuntimeConfig::default()
        });
        let a = Dep::new("a");
        let b = Dep::new("b");

        let _guard = Runtime::enter_notify(&a).unwrap();
        assert!(matches!(
            Runtime::enter_notify(&b),
            Err(BindError::DepthExceeded { depth: 1 })
        ));
    }
}
