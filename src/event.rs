//! Event-driven communication between the daemon's services.

use anyhow::Result;
use tokio::sync::broadcast;

use crate::{config::StatusLabel, drivers::simulated::SimulatedLight, health::DeviceHealth};

/// Application events.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The light was switched to a new status. `from` is `None` on the
    /// first status applied after startup.
    StatusChanged {
        from: Option<StatusLabel>,
        to: StatusLabel,
    },
    HealthChanged(DeviceHealth),
    OverrideChanged(Option<StatusLabel>),
    /// The virtual light changed; rendered by whoever is listening.
    SimulatedLight(SimulatedLight),
    SystemShutdown,
}

/// Publish-subscribe bus shared by all services.
///
/// # Example
///
/// ```no_run
/// use blyncd::{config::StatusLabel, event::{Event, EventBus}};
///
/// let event_bus = EventBus::new();
/// let mut subscriber = event_bus.subscribe();
///
/// event_bus.publish(Event::OverrideChanged(Some(StatusLabel::Focused))).unwrap();
///
/// // In async context:
/// // let event = subscriber.recv().await;
/// ```
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns an error if there are no active subscribers.
    pub fn publish(&self, event: Event) -> Result<()> {
        self.sender.send(event)?;
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
