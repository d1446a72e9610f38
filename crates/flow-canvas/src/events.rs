//! Event streams published by the canvas
//!
//! Each kind of notification has its own [`EventBus`]. Subscribers only see
//! events emitted after they subscribed; nothing is replayed. Closing a bus
//! on teardown ends every subscription.

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::types::{Component, ComponentRef};

const DEFAULT_CAPACITY: usize = 64;

/// Fan-out channel for one event kind
#[derive(Debug)]
pub struct EventBus<T: Clone + Send + 'static> {
    sender: Mutex<Option<broadcast::Sender<T>>>,
}

impl<T: Clone + Send + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<T: Clone + Send + 'static> EventBus<T> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Mutex::new(Some(sender)),
        }
    }

    /// Receive events emitted from now on
    ///
    /// Subscribing to a closed bus yields a receiver that is already closed.
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        match self.sender.lock().as_ref() {
            Some(sender) => sender.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    /// Publish an event; returns how many subscribers received it
    pub fn emit(&self, event: T) -> usize {
        match self.sender.lock().as_ref() {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    pub fn close(&self) {
        self.sender.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }
}

/// Every event stream the canvas exposes
#[derive(Debug, Default)]
pub struct CanvasEvents {
    pub component_created: EventBus<Component>,
    pub component_selected: EventBus<ComponentRef>,
    pub component_deselected: EventBus<ComponentRef>,
    /// A child process group was chosen for navigation
    pub group_selected: EventBus<String>,
    pub component_configured: EventBus<Component>,
    /// Contents of the process group changed through this canvas
    pub process_group_listing_changed: EventBus<String>,
}

impl CanvasEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close(&self) {
        self.component_created.close();
        self.component_selected.close();
        self.component_deselected.close();
        self.group_selected.close();
        self.component_configured.close();
        self.process_group_listing_changed.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let bus = EventBus::<String>::default();
        assert_eq!(bus.emit("unheard".to_string()), 0);

        let mut rx = bus.subscribe();
        assert_eq!(bus.emit("heard".to_string()), 1);
        assert_eq!(rx.recv().await.unwrap(), "heard");
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_close_ends_subscriptions() {
        let bus = EventBus::<u32>::default();
        let mut rx = bus.subscribe();
        bus.emit(1);
        bus.close();

        assert_eq!(rx.recv().await.unwrap(), 1);
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
        assert_eq!(bus.emit(2), 0);

        let mut late = bus.subscribe();
        assert!(matches!(late.recv().await, Err(RecvError::Closed)));
    }

    #[test]
    fn test_canvas_events_close_all() {
        let events = CanvasEvents::new();
        events.close();
        assert!(events.component_created.is_closed());
        assert!(events.process_group_listing_changed.is_closed());
    }
}
