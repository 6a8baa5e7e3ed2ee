//! Shared application state.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{config::Config, device_manager::DeviceManager, store::ConfigStore};

/// State shared by the daemon's services.
///
/// The device manager sits behind an async mutex: a scan or a write holds it
/// across HID calls, and only one task may drive the light at a time.
#[derive(Debug)]
pub struct AppState {
    pub store: Arc<ConfigStore>,
    pub devices: Arc<Mutex<DeviceManager>>,
}

impl AppState {
    pub fn new(store: Arc<ConfigStore>, devices: DeviceManager) -> Self {
        Self {
            store,
            devices: Arc::new(Mutex::new(devices)),
        }
    }

    /// Latest settings, re-read from disk if another process changed them.
    pub async fn config(&self) -> Config {
        self.store.config().await
    }
}
