//! Callback system for circuit breaker state transitions

use std::sync::Arc;

type Callback = Arc<dyn Fn(&str) + Send + Sync>;

/// Callbacks for circuit breaker events
///
/// Each callback receives the circuit name. They run after the breaker has
/// released its state lock, so a callback may inspect the breaker.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_open: Option<Callback>,
    pub on_close: Option<Callback>,
    pub on_half_open: Option<Callback>,
    /// Fired for every call short-circuited by the breaker
    pub on_reject: Option<Callback>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger_open(&self, circuit: &str) {
        if let Some(ref callback) = self.on_open {
            callback(circuit);
        }
    }

    pub fn trigger_close(&self, circuit: &str) {
        if let Some(ref callback) = self.on_close {
            callback(circuit);
        }
    }

    pub fn trigger_half_open(&self, circuit: &str) {
        if let Some(ref callback) = self.on_half_open {
            callback(circuit);
        }
    }

    pub fn trigger_reject(&self, circuit: &str) {
        if let Some(ref callback) = self.on_reject {
            callback(circuit);
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_half_open", &self.on_half_open.is_some())
            .field("on_reject", &self.on_reject.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_unset_callbacks_are_noops() {
        let callbacks = Callbacks::new();

        callbacks.trigger_open("test");
        callbacks.trigger_close("test");
        callbacks.trigger_half_open("test");
        callbacks.trigger_reject("test");
    }

    #[test]
    fn test_callbacks_receive_circuit_name() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_open = seen.clone();
        let seen_reject = seen.clone();

        let callbacks = Callbacks {
            on_open: Some(Arc::new(move |name: &str| {
                seen_open.lock().unwrap().push(format!("open:{}", name))
            })),
            on_reject: Some(Arc::new(move |name: &str| {
                seen_reject.lock().unwrap().push(format!("reject:{}", name))
            })),
            ..Callbacks::default()
        };

        callbacks.trigger_open("billing");
        callbacks.trigger_close("billing");
        callbacks.trigger_reject("billing");

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["open:billing".to_string(), "reject:billing".to_string()]
        );
    }

    #[test]
    fn test_debug_reports_presence_only() {
        let callbacks = Callbacks {
            on_close: Some(Arc::new(|_: &str| {})),
            ..Callbacks::default()
        };

        let rendered = format!("{:?}", callbacks);
        assert!(rendered.contains("on_close: true"));
        assert!(rendered.contains("on_open: false"));
    }
}
