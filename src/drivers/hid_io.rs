use std::{
    ffi::CString,
    fmt,
    sync::{Mutex, PoisonError},
};

use anyhow::{Result, anyhow};
use hidapi::{HidApi, HidDevice};
use log::debug;

/// Output side of an opened HID device.
pub trait DeviceIO: Send + fmt::Debug + 'static {
    fn write(&self, buf: &[u8]) -> Result<usize>;
}

impl DeviceIO for HidDevice {
    fn write(&self, buf: &[u8]) -> Result<usize> {
        Self::write(self, buf).map_err(|e| anyhow!("{e}"))
    }
}

/// Enumerated device, detached from the `hidapi` handle that found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidDeviceInfo {
    pub path: CString,
    pub vendor_id: u16,
    pub product_id: u16,
    pub product: Option<String>,
}

impl HidDeviceInfo {
    /// Product string, or the vendor/product pair when the device has none.
    pub fn label(&self) -> String {
        self.product
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| format!("{:04X}:{:04X}", self.vendor_id, self.product_id))
    }
}

/// Access to the HID subsystem.
pub trait HidBus: Send + Sync + fmt::Debug {
    /// Lists currently attached devices from `vendor_id`.
    fn enumerate(&self, vendor_id: u16) -> Result<Vec<HidDeviceInfo>>;

    /// Opens a previously enumerated device.
    fn open(&self, info: &HidDeviceInfo) -> Result<Box<dyn DeviceIO>>;
}

/// [`HidBus`] backed by the system `hidapi`.
///
/// The context is created on first use, so a machine without HID support
/// only fails when hardware is actually looked for.
#[derive(Default)]
pub struct HidApiBus {
    api: Mutex<Option<HidApi>>,
}

impl HidApiBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_api<T>(&self, f: impl FnOnce(&mut HidApi) -> Result<T>) -> Result<T> {
        let mut guard = self.api.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            debug!("Initializing hidapi");
            *guard = Some(HidApi::new().map_err(|e| anyhow!("hidapi init failed: {e}"))?);
        }
        match guard.as_mut() {
            Some(api) => f(api),
            None => Err(anyhow!("hidapi is not available")),
        }
    }
}

impl fmt::Debug for HidApiBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HidApiBus").finish_non_exhaustive()
    }
}

impl HidBus for HidApiBus {
    fn enumerate(&self, vendor_id: u16) -> Result<Vec<HidDeviceInfo>> {
        self.with_api(|api| {
            api.refresh_devices()
                .map_err(|e| anyhow!("HID enumeration failed: {e}"))?;
            Ok(api
                .device_list()
                .filter(|d| d.vendor_id() == vendor_id)
                .map(|d| HidDeviceInfo {
                    path: d.path().to_owned(),
                    vendor_id: d.vendor_id(),
                    product_id: d.product_id(),
                    product: d.product_string().map(str::to_owned),
                })
                .collect())
        })
    }

    fn open(&self, info: &HidDeviceInfo) -> Result<Box<dyn DeviceIO>> {
        self.with_api(|api| {
            let device = api
                .open_path(&info.path)
                .map_err(|e| anyhow!("Failed to open {}: {e}", info.label()))?;
            Ok(Box::new(device) as Box<dyn DeviceIO>)
        })
    }
}
