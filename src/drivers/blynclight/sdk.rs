//! Minimal Blynclight device SDK.
//!
//! Models the light as a small state record that is flushed to the device as
//! a single nine-byte output report. The device takes its color channels in
//! red, blue, green order; callers of [`BlyncLight::set_color`] pass them in
//! that native order.

use anyhow::{Context, Result};
use log::debug;

use crate::drivers::hid_io::{DeviceIO, HidBus, HidDeviceInfo};

/// `(vendor, product)` pairs of supported lights.
pub const KNOWN_DEVICES: &[(u16, u16)] = &[
    (0x2C0D, 0x0001), // Blynclight
    (0x2C0D, 0x000C), // Blynclight Plus
    (0x2C0D, 0x0010), // Blynclight Mini
    (0x0E53, 0x2516),
    (0x0E53, 0x2517),
    (0x0E53, 0x2518),
    (0x0E53, 0x2519),
];

const OFF_BIT: u8 = 0x01;
const DIM_BIT: u8 = 0x02;
const FLASH_BIT: u8 = 0x04;
const SPEED_SHIFT: u8 = 3;
const REPORT_TRAILER: [u8; 4] = [0x00, 0x00, 0xFF, 0x22];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlashSpeed {
    #[default]
    Slow = 1,
    Medium = 2,
    Fast = 4,
}

/// Desired device state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LightState {
    pub on: bool,
    /// Red, blue, green.
    pub color: (u8, u8, u8),
    pub dim: bool,
    pub flash: bool,
    pub speed: FlashSpeed,
}

impl LightState {
    pub fn control_byte(&self) -> u8 {
        let mut control = (self.speed as u8) << SPEED_SHIFT;
        if !self.on {
            control |= OFF_BIT;
        }
        if self.dim {
            control |= DIM_BIT;
        }
        if self.flash {
            control |= FLASH_BIT;
        }
        control
    }

    pub fn report(&self) -> [u8; 9] {
        let (red, blue, green) = self.color;
        let [t0, t1, t2, t3] = REPORT_TRAILER;
        [0x00, red, blue, green, self.control_byte(), t0, t1, t2, t3]
    }
}

/// Lists attached lights in a stable order.
pub fn available_lights(bus: &dyn HidBus) -> Result<Vec<HidDeviceInfo>> {
    let mut vendors: Vec<u16> = KNOWN_DEVICES.iter().map(|(vid, _)| *vid).collect();
    vendors.dedup();

    let mut lights = Vec::new();
    for vendor in vendors {
        lights.extend(
            bus.enumerate(vendor)?
                .into_iter()
                .filter(|d| KNOWN_DEVICES.contains(&(d.vendor_id, d.product_id))),
        );
    }
    Ok(lights)
}

/// Opens the light at `index`, `None` when fewer lights are attached.
pub fn get_light(bus: &dyn HidBus, index: usize) -> Result<Option<BlyncLight>> {
    let Some(info) = available_lights(bus)?.into_iter().nth(index) else {
        return Ok(None);
    };
    let dev = bus
        .open(&info)
        .with_context(|| format!("Cannot open {}", info.label()))?;
    debug!("Opened {} at {:?}", info.label(), info.path);
    Ok(Some(BlyncLight {
        info,
        dev,
        state: LightState::default(),
        written: None,
    }))
}

/// Handle to one opened light.
#[derive(Debug)]
pub struct BlyncLight {
    info: HidDeviceInfo,
    dev: Box<dyn DeviceIO>,
    state: LightState,
    written: Option<LightState>,
}

impl BlyncLight {
    pub fn info(&self) -> &HidDeviceInfo {
        &self.info
    }

    pub fn state(&self) -> &LightState {
        &self.state
    }

    pub fn set_on(&mut self, on: bool) {
        self.state.on = on;
    }

    /// Sets the color in the device's red, blue, green order.
    pub fn set_color(&mut self, color: (u8, u8, u8)) {
        self.state.color = color;
    }

    pub fn set_dim(&mut self, dim: bool) {
        self.state.dim = dim;
    }

    pub fn set_flash(&mut self, flash: bool, speed: FlashSpeed) {
        self.state.flash = flash;
        self.state.speed = speed;
    }

    /// Flushes the state to the device.
    ///
    /// Writes only if the state changed since the last successful write,
    /// unless `force` is set. Returns whether a report was sent.
    pub fn update(&mut self, force: bool) -> Result<bool> {
        if !force && self.written == Some(self.state) {
            return Ok(false);
        }
        self.dev
            .write(&self.state.report())
            .with_context(|| format!("Write to {} failed", self.info.label()))?;
        self.written = Some(self.state);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::testing::FakeBus;
    use pretty_assertions::assert_eq;

    #[test]
    fn control_byte_bits() {
        let mut state = LightState::default();
        assert_eq!(state.control_byte(), 0x08 | OFF_BIT);

        state.on = true;
        state.dim = true;
        state.flash = true;
        state.speed = FlashSpeed::Fast;
        assert_eq!(state.control_byte(), 0x20 | DIM_BIT | FLASH_BIT);
    }

    #[test]
    fn report_layout() {
        let state = LightState {
            on: true,
            color: (10, 20, 30),
            ..LightState::default()
        };
        assert_eq!(
            state.report(),
            [0x00, 10, 20, 30, 0x08, 0x00, 0x00, 0xFF, 0x22]
        );
    }

    #[test]
    fn only_known_products_are_listed() {
        let bus = FakeBus::with_device(0x2C0D, 0x9999, "Headset");
        bus.plug(0x0E53, 0x2517, "Blynclight Standard");
        bus.plug(0x2C0D, 0x000C, "Blynclight Plus");

        let lights = available_lights(&bus).unwrap();

        let products: Vec<_> = lights.iter().map(|l| l.product_id).collect();
        assert_eq!(products, vec![0x000C, 0x2517]);
    }

    #[test]
    fn missing_index_is_none() {
        let bus = FakeBus::default();
        assert!(get_light(&bus, 0).unwrap().is_none());
    }

    #[test]
    fn update_skips_clean_state_unless_forced() {
        let bus = FakeBus::with_device(0x2C0D, 0x0001, "Blynclight");
        let mut light = get_light(&bus, 0).unwrap().unwrap();
        light.set_on(true);
        light.set_color((255, 0, 0));

        assert!(light.update(false).unwrap());
        assert!(!light.update(false).unwrap());
        assert!(light.update(true).unwrap());
        assert_eq!(bus.writes().len(), 2);
    }

    #[test]
    fn failed_write_keeps_state_dirty() {
        let bus = FakeBus::with_device(0x2C0D, 0x0001, "Blynclight");
        let mut light = get_light(&bus, 0).unwrap().unwrap();
        bus.fail_writes(true);

        assert!(light.update(false).is_err());

        bus.fail_writes(false);
        assert!(light.update(false).unwrap());
    }
}
