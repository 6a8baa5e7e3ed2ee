//! In-memory HID bus for driver tests.

use std::{
    ffi::CString,
    sync::{Arc, Mutex},
};

use anyhow::{Result, anyhow};

use super::hid_io::{DeviceIO, HidBus, HidDeviceInfo};

#[derive(Debug, Default)]
struct BusState {
    devices: Vec<HidDeviceInfo>,
    writes: Vec<Vec<u8>>,
    fail_writes: bool,
    fail_enumerate: bool,
}

/// Fake bus recording every report written to any device it opened.
#[derive(Debug, Clone, Default)]
pub struct FakeBus(Arc<Mutex<BusState>>);

impl FakeBus {
    pub fn with_device(vendor_id: u16, product_id: u16, product: &str) -> Self {
        let bus = Self::default();
        bus.plug(vendor_id, product_id, product);
        bus
    }

    pub fn plug(&self, vendor_id: u16, product_id: u16, product: &str) {
        let mut state = self.0.lock().unwrap();
        let path = CString::new(format!("/dev/hidraw{}", state.devices.len())).unwrap();
        state.devices.push(HidDeviceInfo {
            path,
            vendor_id,
            product_id,
            product: Some(product.to_string()),
        });
    }

    pub fn unplug_all(&self) {
        self.0.lock().unwrap().devices.clear();
    }

    pub fn fail_writes(&self, fail: bool) {
        self.0.lock().unwrap().fail_writes = fail;
    }

    pub fn fail_enumerate(&self, fail: bool) {
        self.0.lock().unwrap().fail_enumerate = fail;
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap().writes.clone()
    }
}

impl HidBus for FakeBus {
    fn enumerate(&self, vendor_id: u16) -> Result<Vec<HidDeviceInfo>> {
        let state = self.0.lock().unwrap();
        if state.fail_enumerate {
            return Err(anyhow!("enumeration failed"));
        }
        Ok(state
            .devices
            .iter()
            .filter(|d| d.vendor_id == vendor_id)
            .cloned()
            .collect())
    }

    fn open(&self, info: &HidDeviceInfo) -> Result<Box<dyn DeviceIO>> {
        let state = self.0.lock().unwrap();
        if !state.devices.iter().any(|d| d.path == info.path) {
            return Err(anyhow!("no such device"));
        }
        Ok(Box::new(FakeDevice(self.0.clone())))
    }
}

#[derive(Debug)]
struct FakeDevice(Arc<Mutex<BusState>>);

impl DeviceIO for FakeDevice {
    fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut state = self.0.lock().unwrap();
        if state.fail_writes {
            return Err(anyhow!("write failed"));
        }
        state.writes.push(buf.to_vec());
        Ok(buf.len())
    }
}
