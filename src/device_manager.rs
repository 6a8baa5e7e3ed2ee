//! Failover and self-healing over the available light backends.
//!
//! Hardware candidates are scanned in order and the first that connects
//! drives the light. When none does, the simulated backend takes over so the
//! rest of the daemon never has to care whether a light is attached. A lost
//! device is noticed either by a failed write or by a liveness check and
//! triggers a fresh scan.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, info, warn};

use crate::{
    config::StatusLabel,
    drivers::{self, hid_io::HidBus},
    health::{DeviceHealth, HealthCode},
    light::LightBackend,
    store::ConfigStore,
};

/// Minimum time between hardware scans while running on the simulated light.
pub const RESCAN_INTERVAL: Duration = Duration::from_secs(2);

pub const VIRTUAL_MODE_MESSAGE: &str = "No physical light found. Virtual Mode active.";

/// Backend currently driving the light.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveBackend {
    Hardware(usize),
    Simulated,
}

#[derive(Debug)]
pub struct DeviceManager {
    hardware: Vec<Box<dyn LightBackend>>,
    simulated: Box<dyn LightBackend>,
    active: Option<ActiveBackend>,
    health: DeviceHealth,
    last_scan: Option<Instant>,
    rescan_interval: Duration,
    scans: u64,
    store: Option<Arc<ConfigStore>>,
}

impl DeviceManager {
    pub fn new(hardware: Vec<Box<dyn LightBackend>>, simulated: Box<dyn LightBackend>) -> Self {
        Self {
            hardware,
            simulated,
            active: None,
            health: DeviceHealth::searching(),
            last_scan: None,
            rescan_interval: RESCAN_INTERVAL,
            scans: 0,
            store: None,
        }
    }

    /// Manager over the standard hardware candidates on `bus`.
    pub fn with_hardware(bus: Arc<dyn HidBus>, simulated: Box<dyn LightBackend>) -> Self {
        Self::new(drivers::hardware_candidates(bus), simulated)
    }

    /// Publishes every health change to the store's status document.
    pub fn with_store(mut self, store: Arc<ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_rescan_interval(mut self, interval: Duration) -> Self {
        self.rescan_interval = interval;
        self
    }

    /// Scans for hardware, falling back to the simulated light.
    ///
    /// Always leaves a backend active. Returns whether it is hardware.
    pub async fn connect(&mut self) -> bool {
        self.scans += 1;
        self.last_scan = Some(Instant::now());
        debug!("Scanning for lights (scan #{})", self.scans);

        for idx in 0..self.hardware.len() {
            let outcome = self.hardware[idx].connect().await;
            if outcome.ok {
                self.release_previous(Some(idx)).await;
                self.active = Some(ActiveBackend::Hardware(idx));
                self.update_health(HealthCode::Connected, &outcome.message)
                    .await;
                return true;
            }
            debug!("{}: {}", self.hardware[idx].name(), outcome.message);
        }

        self.release_previous(None).await;
        self.simulated.connect().await;
        self.active = Some(ActiveBackend::Simulated);
        self.update_health(HealthCode::NotDetected, VIRTUAL_MODE_MESSAGE)
            .await;
        false
    }

    /// Current health, re-checking the device first.
    ///
    /// Lost hardware triggers a rescan right away. While on the simulated
    /// light, hardware is looked for at most once per rescan interval.
    pub async fn get_connection_status(&mut self) -> DeviceHealth {
        match self.active {
            None => {
                self.connect().await;
            }
            Some(ActiveBackend::Hardware(idx)) => {
                if !self.hardware[idx].is_alive().await {
                    info!("{} is gone, rescanning", self.hardware[idx].name());
                    self.connect().await;
                }
            }
            Some(ActiveBackend::Simulated) => {
                let due = self
                    .last_scan
                    .is_none_or(|at| at.elapsed() >= self.rescan_interval);
                if due {
                    self.connect().await;
                }
            }
        }
        self.health.clone()
    }

    /// Shows a color, rescanning and retrying once if the write fails.
    pub async fn set_color(&mut self, red: u8, green: u8, blue: u8) -> bool {
        if self.active.is_none() {
            self.connect().await;
        }
        if self.backend_mut().set_color(red, green, blue).await {
            return true;
        }

        warn!(
            "{} failed to show rgb({red},{green},{blue}), rescanning",
            self.backend_mut().name()
        );
        self.connect().await;
        self.backend_mut().set_color(red, green, blue).await
    }

    pub async fn turn_off(&mut self) -> bool {
        if self.active.is_none() {
            return false;
        }
        self.backend_mut().turn_off().await
    }

    /// Shows the color for `label`, switching the light off for `Off`.
    pub async fn set_status(&mut self, label: StatusLabel) -> bool {
        match label.rgb() {
            Some((red, green, blue)) => self.set_color(red, green, blue).await,
            None => {
                if self.active.is_none() {
                    self.connect().await;
                }
                self.turn_off().await
            }
        }
    }

    /// Like [`set_status`](Self::set_status) for an unparsed label.
    pub async fn set_status_color(&mut self, label: &str) -> bool {
        match label.parse::<StatusLabel>() {
            Ok(label) => self.set_status(label).await,
            Err(e) => {
                warn!("Not changing the light: {e}");
                false
            }
        }
    }

    pub fn health(&self) -> &DeviceHealth {
        &self.health
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.active, Some(ActiveBackend::Hardware(_)))
    }

    pub fn is_simulated(&self) -> bool {
        self.active == Some(ActiveBackend::Simulated)
    }

    /// Name of the backend driving the light.
    pub fn active_backend(&self) -> Option<&'static str> {
        self.active.map(|active| match active {
            ActiveBackend::Hardware(idx) => self.hardware[idx].name(),
            ActiveBackend::Simulated => self.simulated.name(),
        })
    }

    /// Number of scans performed so far.
    pub fn scan_count(&self) -> u64 {
        self.scans
    }

    fn backend_mut(&mut self) -> &mut dyn LightBackend {
        match self.active {
            Some(ActiveBackend::Hardware(idx)) if idx < self.hardware.len() => {
                self.hardware[idx].as_mut()
            }
            _ => self.simulated.as_mut(),
        }
    }

    async fn release_previous(&mut self, winner: Option<usize>) {
        if let Some(ActiveBackend::Hardware(prev)) = self.active {
            if Some(prev) != winner {
                info!("Releasing {}", self.hardware[prev].name());
                self.hardware[prev].disconnect().await;
            }
        }
    }

    async fn update_health(&mut self, code: HealthCode, message: &str) {
        if self.health.describes(code, message) {
            return;
        }

        info!("Light status: {code} ({message})");
        self.health = DeviceHealth::new(code, message);

        if let Some(store) = &self.store {
            if let Err(e) = store.publish_health(&self.health).await {
                warn!("Failed to publish device status: {e:#}");
            }
        }
    }
}
