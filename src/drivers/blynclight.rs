pub mod sdk;

use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};

use crate::{
    drivers::hid_io::HidBus,
    light::{ConnectOutcome, LightBackend},
};

use self::sdk::BlyncLight;

/// Drives the first attached Blynclight through the device SDK.
#[derive(Debug)]
pub struct LibraryBackend {
    bus: Arc<dyn HidBus>,
    light: Option<BlyncLight>,
}

impl LibraryBackend {
    pub fn new(bus: Arc<dyn HidBus>) -> Self {
        Self { bus, light: None }
    }

    fn drop_handle(&mut self, reason: impl std::fmt::Display) {
        if self.light.take().is_some() {
            warn!("Blynclight library lost the device: {reason}");
        }
    }

    fn flush(&mut self, apply: impl FnOnce(&mut BlyncLight)) -> bool {
        let Some(light) = self.light.as_mut() else {
            return false;
        };
        apply(light);
        match light.update(true) {
            Ok(_) => true,
            Err(e) => {
                self.drop_handle(format!("{e:#}"));
                false
            }
        }
    }
}

#[async_trait]
impl LightBackend for LibraryBackend {
    fn name(&self) -> &'static str {
        "blynclight-library"
    }

    async fn connect(&mut self) -> ConnectOutcome {
        self.light = None;
        match sdk::get_light(self.bus.as_ref(), 0) {
            Ok(Some(light)) => {
                info!("Blynclight library opened {}", light.info().label());
                self.light = Some(light);
                ConnectOutcome::connected("Connected via Blynclight library")
            }
            Ok(None) => ConnectOutcome::failed("No Blynclight hardware detected."),
            Err(e) => ConnectOutcome::failed(format!("{e:#}")),
        }
    }

    async fn disconnect(&mut self) {
        self.light = None;
    }

    async fn is_alive(&mut self) -> bool {
        let Some(path) = self.light.as_ref().map(|l| l.info().path.clone()) else {
            return false;
        };
        match sdk::available_lights(self.bus.as_ref()) {
            Ok(lights) if lights.iter().any(|l| l.path == path) => true,
            Ok(_) => {
                self.drop_handle("device no longer enumerated");
                false
            }
            Err(e) => {
                self.drop_handle(format!("{e:#}"));
                false
            }
        }
    }

    async fn set_color(&mut self, red: u8, green: u8, blue: u8) -> bool {
        self.flush(|light| {
            light.set_on(true);
            light.set_color((red, blue, green));
        })
    }

    async fn turn_off(&mut self) -> bool {
        self.flush(|light| light.set_on(false))
    }
}
