//! Dispatcher (§4.7): routes parsed records to registered handlers by
//! `type`. Built-in control types (`heartbeat`, `ack`) never reach this
//! registry — the session intercepts them before dispatch.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("handler for '{message_type}' failed: {reason}")]
    Failed {
        message_type: String,
        reason: String,
    },
}

pub type Handler = Box<dyn Fn(&Value) -> Result<(), HandlerError> + Send + Sync>;

const WILDCARD: &str = "*";

#[derive(Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    HandledByWildcard,
    Unhandled,
}

/// Per-session registry of message handlers, owned by the orchestrator
/// (never a process-wide singleton — see §9).
pub struct Dispatcher {
    handlers: Mutex<HashMap<String, Handler>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher {
            handlers: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, message_type: impl Into<String>, handler: Handler) {
        self.handlers
            .lock()
            .expect("handler map mutex poisoned")
            .insert(message_type.into(), handler);
    }

    pub fn unregister(&self, message_type: &str) {
        self.handlers
            .lock()
            .expect("handler map mutex poisoned")
            .remove(message_type);
    }

    /// Exact match wins; a `*` handler receives otherwise-unhandled
    /// messages; absence is reported as `Unhandled` for the caller to log.
    pub fn dispatch(&self, message_type: &str, value: &Value) -> DispatchOutcome {
        let handlers = self.handlers.lock().expect("handler map mutex poisoned");

        if let Some(handler) = handlers.get(message_type) {
            if let Err(e) = handler(value) {
                log::warn!("handler for '{message_type}' returned an error: {e}");
            }
            return DispatchOutcome::Handled;
        }

        if let Some(handler) = handlers.get(WILDCARD) {
            if let Err(e) = handler(value) {
                log::warn!("wildcard handler failed on '{message_type}': {e}");
            }
            return DispatchOutcome::HandledByWildcard;
        }

        DispatchOutcome::Unhandled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn exact_match_wins_over_wildcard() {
        let dispatcher = Dispatcher::new();
        let exact_hits = Arc::new(AtomicUsize::new(0));
        let wildcard_hits = Arc::new(AtomicUsize::new(0));

        let e = exact_hits.clone();
        dispatcher.register(
            "chat",
            Box::new(move |_| {
                e.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        let w = wildcard_hits.clone();
        dispatcher.register(
            "*",
            Box::new(move |_| {
                w.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        let outcome = dispatcher.dispatch("chat", &json!({"type": "chat"}));
        assert_eq!(outcome, DispatchOutcome::Handled);
        assert_eq!(exact_hits.load(Ordering::SeqCst), 1);
        assert_eq!(wildcard_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn wildcard_catches_otherwise_unhandled() {
        let dispatcher = Dispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        dispatcher.register(
            "*",
            Box::new(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        let outcome = dispatcher.dispatch("interact", &json!({"type": "interact"}));
        assert_eq!(outcome, DispatchOutcome::HandledByWildcard);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn no_handler_reports_unhandled() {
        let dispatcher = Dispatcher::new();
        let outcome = dispatcher.dispatch("move", &json!({"type": "move"}));
        assert_eq!(outcome, DispatchOutcome::Unhandled);
    }

    #[test]
    fn unregister_removes_handler() {
        let dispatcher = Dispatcher::new();
        dispatcher.register("chat", Box::new(|_| Ok(())));
        dispatcher.unregister("chat");
        assert_eq!(
            dispatcher.dispatch("chat", &json!({"type": "chat"})),
            DispatchOutcome::Unhandled
        );
    }
}
