//! Stream lifecycle events
//!
//! Central hub that fans engine notifications out to registered listeners.
//! Delivery is synchronous and ordered; a panicking listener is isolated so
//! the others (and the engine) carry on.

use parking_lot::RwLock;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::StreamState;
use crate::error::StreamError;

/// Events raised by a stream engine
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// The engine accepted a start request
    Started,
    /// The engine moved to a new state; a terminal error rides along with `Stopped`
    StateChanged {
        state: StreamState,
        error: Option<StreamError>,
    },
    /// The server sent a blank keep-alive line
    KeepAliveReceived,
}

impl LifecycleEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::Started => "started",
            LifecycleEvent::StateChanged { .. } => "state_changed",
            LifecycleEvent::KeepAliveReceived => "keep_alive",
        }
    }
}

/// Identifies a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ListenerId(u64);

/// A listener panicked while handling an event
#[derive(Debug, Clone)]
pub struct ListenerFault {
    pub listener: ListenerId,
    pub event: &'static str,
    pub message: String,
}

type Listener = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;
type FaultReporter = Arc<dyn Fn(&ListenerFault) + Send + Sync>;

/// Multi-subscriber notification hub
#[derive(Clone, Default)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    fault_reporter: RwLock<Option<FaultReporter>>,
    next_id: AtomicU64,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; it receives every event emitted after this call
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Forward events into an unbounded channel
    ///
    /// The listener stays registered after the receiver is dropped; sends to a
    /// closed channel are ignored.
    pub fn subscribe_channel(&self) -> mpsc::UnboundedReceiver<LifecycleEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(move |event| {
            let _ = tx.send(event.clone());
        });
        rx
    }

    /// Remove a listener; returns whether it was registered
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.write();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }

    /// Receive reports about panicking listeners
    pub fn set_fault_reporter<F>(&self, reporter: F)
    where
        F: Fn(&ListenerFault) + Send + Sync + 'static,
    {
        *self.inner.fault_reporter.write() = Some(Arc::new(reporter));
    }

    /// Deliver an event to every listener, in registration order
    pub fn emit(&self, event: LifecycleEvent) {
        debug!("Stream event: {:?}", event);

        // Snapshot so listeners may subscribe/unsubscribe while handling
        let listeners: Vec<(ListenerId, Listener)> = self.inner.listeners.read().clone();

        for (id, listener) in listeners {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(&event))) {
                let fault = ListenerFault {
                    listener: id,
                    event: event.kind(),
                    message: panic_message(panic.as_ref()),
                };
                warn!(
                    "Listener {:?} panicked on {} event: {}",
                    fault.listener, fault.event, fault.message
                );
                self.report_fault(&fault);
            }
        }
    }

    fn report_fault(&self, fault: &ListenerFault) {
        let reporter = self.inner.fault_reporter.read().clone();
        if let Some(reporter) = reporter {
            // A failing reporter must not take the engine down either
            if catch_unwind(AssertUnwindSafe(|| reporter(fault))).is_err() {
                warn!("Listener fault reporter panicked");
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder(hub: &EventHub) -> Arc<Mutex<Vec<&'static str>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        hub.subscribe(move |event| sink.lock().push(event.kind()));
        seen
    }

    #[test]
    fn test_delivery_order() {
        let hub = EventHub::new();
        let seen = recorder(&hub);

        hub.emit(LifecycleEvent::Started);
        hub.emit(LifecycleEvent::StateChanged {
            state: StreamState::Running,
            error: None,
        });
        hub.emit(LifecycleEvent::KeepAliveReceived);

        assert_eq!(*seen.lock(), vec!["started", "state_changed", "keep_alive"]);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let hub = EventHub::new();
        let faults = Arc::new(Mutex::new(Vec::new()));
        let fault_sink = faults.clone();
        hub.set_fault_reporter(move |fault| fault_sink.lock().push(fault.message.clone()));

        hub.subscribe(|_| panic!("listener exploded"));
        let seen = recorder(&hub);

        hub.emit(LifecycleEvent::Started);
        hub.emit(LifecycleEvent::KeepAliveReceived);

        assert_eq!(*seen.lock(), vec!["started", "keep_alive"]);
        assert_eq!(faults.lock().len(), 2);
        assert_eq!(faults.lock()[0], "listener exploded");
    }

    #[test]
    fn test_unsubscribe() {
        let hub = EventHub::new();
        let seen = Arc::new(Mutex::new(0usize));
        let sink = seen.clone();
        let id = hub.subscribe(move |_| *sink.lock() += 1);

        hub.emit(LifecycleEvent::Started);
        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        hub.emit(LifecycleEvent::Started);

        assert_eq!(*seen.lock(), 1);
        assert_eq!(hub.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_channel_subscription() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe_channel();

        hub.emit(LifecycleEvent::Started);
        hub.emit(LifecycleEvent::KeepAliveReceived);

        assert!(matches!(rx.recv().await, Some(LifecycleEvent::Started)));
        assert!(matches!(
            rx.recv().await,
            Some(LifecycleEvent::KeepAliveReceived)
        ));
    }
}
