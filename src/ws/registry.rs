use crate::core::errors::WsError;
use crate::ws::types::WsEvent;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

pub type Callback<T> = Box<dyn FnMut(WsEvent<T>) -> Result<(), WsError> + Send>;

/// One family's subscription table: key to callback, at most one callback per
/// exact key.
///
/// Registration happens from arbitrary caller tasks while dispatch runs on
/// the read loop, so the table is internally synchronized. Unregistering
/// takes effect strictly between run-loop invocations: the map entry is
/// removed immediately, but a callback invocation already in flight for that
/// key runs to completion.
pub struct Registry<K, T> {
    entries: Mutex<HashMap<K, Arc<Mutex<Callback<T>>>>>,
}

impl<K, T> Default for Registry<K, T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash, T> Registry<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `key` with `callback`. `topic` is the wire topic string,
    /// used only for error reporting.
    pub fn register(&self, key: K, topic: &str, callback: Callback<T>) -> Result<(), WsError> {
        let mut entries = self.entries.lock().expect("registry mutex poisoned");
        match entries.entry(key) {
            Entry::Occupied(_) => Err(WsError::DuplicateSubscription(topic.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(callback)));
                Ok(())
            }
        }
    }

    /// Remove the entry for `key`; a no-op if absent.
    pub fn unregister(&self, key: &K) {
        self.entries
            .lock()
            .expect("registry mutex poisoned")
            .remove(key);
    }

    /// Invoke the callback registered for `key` with `event`.
    ///
    /// A classified event with no registered callback indicates a
    /// caller/protocol mismatch and is a hard error, never silently dropped.
    pub fn dispatch(&self, key: &K, topic: &str, event: WsEvent<T>) -> Result<(), WsError> {
        let handler = {
            let entries = self.entries.lock().expect("registry mutex poisoned");
            entries.get(key).map(Arc::clone)
        };
        let Some(handler) = handler else {
            return Err(WsError::UnknownSubscription(topic.to_string()));
        };
        // The table lock is released before the call, so a callback may
        // subscribe or unsubscribe without deadlocking.
        let mut callback = handler.lock().expect("callback mutex poisoned");
        (callback)(event)
    }

    #[cfg(test)]
    pub fn contains(&self, key: &K) -> bool {
        self.entries
            .lock()
            .expect("registry mutex poisoned")
            .contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: i64) -> WsEvent<i64> {
        WsEvent {
            topic: "test".to_string(),
            kind: None,
            ts: None,
            data: n,
        }
    }

    fn noop() -> Callback<i64> {
        Box::new(|_| Ok(()))
    }

    #[test]
    fn second_registration_for_same_key_is_rejected() {
        let registry: Registry<String, i64> = Registry::new();
        registry
            .register("BTCUSDT".to_string(), "tickers.BTCUSDT", noop())
            .unwrap();
        let err = registry
            .register("BTCUSDT".to_string(), "tickers.BTCUSDT", noop())
            .unwrap_err();
        assert!(matches!(err, WsError::DuplicateSubscription(topic) if topic == "tickers.BTCUSDT"));
    }

    #[test]
    fn key_is_reusable_after_unregister() {
        let registry: Registry<String, i64> = Registry::new();
        registry
            .register("BTCUSDT".to_string(), "tickers.BTCUSDT", noop())
            .unwrap();
        registry.unregister(&"BTCUSDT".to_string());
        assert!(!registry.contains(&"BTCUSDT".to_string()));
        registry
            .register("BTCUSDT".to_string(), "tickers.BTCUSDT", noop())
            .unwrap();
    }

    #[test]
    fn unregister_of_absent_key_is_a_noop() {
        let registry: Registry<String, i64> = Registry::new();
        registry.unregister(&"missing".to_string());
    }

    #[test]
    fn dispatch_without_entry_is_unknown_subscription() {
        let registry: Registry<String, i64> = Registry::new();
        let err = registry
            .dispatch(&"BTCUSDT".to_string(), "tickers.BTCUSDT", event(1))
            .unwrap_err();
        assert!(matches!(err, WsError::UnknownSubscription(topic) if topic == "tickers.BTCUSDT"));
    }

    #[test]
    fn dispatch_invokes_the_registered_callback() {
        let registry: Registry<(), i64> = Registry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        registry
            .register(
                (),
                "order",
                Box::new(move |event| {
                    sink.lock().unwrap().push(event.data);
                    Ok(())
                }),
            )
            .unwrap();
        registry.dispatch(&(), "order", event(7)).unwrap();
        registry.dispatch(&(), "order", event(8)).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![7, 8]);
    }

    #[test]
    fn callback_errors_propagate() {
        let registry: Registry<(), i64> = Registry::new();
        registry
            .register(
                (),
                "order",
                Box::new(|_| Err(WsError::AuthFailed("from callback".to_string()))),
            )
            .unwrap();
        let err = registry.dispatch(&(), "order", event(1)).unwrap_err();
        assert!(matches!(err, WsError::AuthFailed(_)));
    }
}
