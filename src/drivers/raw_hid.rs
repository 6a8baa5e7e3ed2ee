pub mod protocol;

use std::{ffi::CString, sync::Arc};

use async_trait::async_trait;
use log::{info, warn};

use crate::{
    drivers::hid_io::{DeviceIO, HidBus},
    light::{ConnectOutcome, LightBackend},
};

use self::protocol::ReportLayout;

pub const VID: u16 = 0x2C0D; // Embrava

/// Writes raw output reports to the first Embrava device found.
#[derive(Debug)]
pub struct RawHidBackend {
    bus: Arc<dyn HidBus>,
    dev: Option<Box<dyn DeviceIO>>,
    path: Option<CString>,
}

impl RawHidBackend {
    pub fn new(bus: Arc<dyn HidBus>) -> Self {
        Self {
            bus,
            dev: None,
            path: None,
        }
    }

    fn close(&mut self) {
        self.dev = None;
        self.path = None;
    }
}

#[async_trait]
impl LightBackend for RawHidBackend {
    fn name(&self) -> &'static str {
        "raw-hid"
    }

    async fn connect(&mut self) -> ConnectOutcome {
        self.close();

        let devices = match self.bus.enumerate(VID) {
            Ok(devices) => devices,
            Err(e) => return ConnectOutcome::failed(format!("{e:#}")),
        };
        let Some(info) = devices.into_iter().next() else {
            return ConnectOutcome::failed("No Embrava HID device found.");
        };

        match self.bus.open(&info) {
            Ok(dev) => {
                info!("{} device PID={:04X}", info.label(), info.product_id);
                self.dev = Some(dev);
                self.path = Some(info.path.clone());
                ConnectOutcome::connected(format!("Connected to {} (Direct HID)", info.label()))
            }
            Err(e) => ConnectOutcome::failed(format!("{e:#}")),
        }
    }

    async fn disconnect(&mut self) {
        self.close();
    }

    async fn is_alive(&mut self) -> bool {
        let Some(path) = self.path.as_ref() else {
            return false;
        };
        match self.bus.enumerate(VID) {
            Ok(devices) => devices.iter().any(|d| &d.path == path),
            Err(e) => {
                warn!("Raw HID enumeration failed: {e:#}");
                false
            }
        }
    }

    async fn set_color(&mut self, red: u8, green: u8, blue: u8) -> bool {
        let Some(dev) = self.dev.as_ref() else {
            return false;
        };
        let result = ReportLayout::ALL
            .into_iter()
            .try_for_each(|layout| dev.write(&layout.to_bytes(red, green, blue)).map(|_| ()));

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("Raw HID write failed, closing device: {e:#}");
                self.close();
                false
            }
        }
    }

    async fn turn_off(&mut self) -> bool {
        self.set_color(0, 0, 0).await
    }
}
