//! Application state provider.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use log::debug;

use crate::{
    app_context::AppState,
    device_manager::DeviceManager,
    drivers::{
        hid_io::{HidApiBus, HidBus},
        simulated::{LightListener, SimulatedBackend},
    },
    event::{Event, EventBus},
    providers::traits::AsyncProvider,
    store::ConfigStore,
};

/// Builds the shared state: the store plus a device manager wired to it.
///
/// Changes of the virtual light are published on the event bus so they can
/// be rendered (or at least logged) while no hardware is attached.
pub struct AppStateProvider {
    store: Arc<ConfigStore>,
    event_bus: EventBus,
    bus: Arc<dyn HidBus>,
}

impl AppStateProvider {
    pub fn new(store: Arc<ConfigStore>, event_bus: EventBus) -> Self {
        Self {
            store,
            event_bus,
            bus: Arc::new(HidApiBus::new()),
        }
    }

    /// Uses `bus` instead of the system HID subsystem.
    pub fn with_bus(mut self, bus: Arc<dyn HidBus>) -> Self {
        self.bus = bus;
        self
    }

    fn simulated_listener(&self) -> LightListener {
        let event_bus = self.event_bus.clone();
        Arc::new(move |light| {
            if event_bus.publish(Event::SimulatedLight(light)).is_err() {
                debug!("Virtual light {light} (no subscribers)");
            }
        })
    }
}

#[async_trait]
impl AsyncProvider<Arc<AppState>> for AppStateProvider {
    async fn provide(&self) -> Result<Arc<AppState>> {
        let simulated = SimulatedBackend::with_listener(self.simulated_listener());
        let devices = DeviceManager::with_hardware(self.bus.clone(), Box::new(simulated))
            .with_store(self.store.clone());
        Ok(Arc::new(AppState::new(self.store.clone(), devices)))
    }
}
