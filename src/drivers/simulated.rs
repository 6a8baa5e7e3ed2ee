use std::{fmt, sync::Arc};

use async_trait::async_trait;
use log::debug;

use crate::light::{ConnectOutcome, LightBackend};

/// What the virtual light is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedLight {
    Color { red: u8, green: u8, blue: u8 },
    Off,
}

impl fmt::Display for SimulatedLight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulatedLight::Color { red, green, blue } => write!(f, "rgb({red},{green},{blue})"),
            SimulatedLight::Off => f.write_str("off"),
        }
    }
}

/// Callback receiving every change of the virtual light.
pub type LightListener = Arc<dyn Fn(SimulatedLight) + Send + Sync>;

/// Virtual light used when no hardware is attached. Never fails.
#[derive(Default)]
pub struct SimulatedBackend {
    current: Option<SimulatedLight>,
    listener: Option<LightListener>,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listener(listener: LightListener) -> Self {
        Self {
            current: None,
            listener: Some(listener),
        }
    }

    /// Last state shown, `None` before the first change.
    pub fn current(&self) -> Option<SimulatedLight> {
        self.current
    }

    fn show(&mut self, light: SimulatedLight) -> bool {
        debug!("Virtual light: {light}");
        self.current = Some(light);
        if let Some(listener) = &self.listener {
            listener(light);
        }
        true
    }
}

impl fmt::Debug for SimulatedBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedBackend")
            .field("current", &self.current)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

#[async_trait]
impl LightBackend for SimulatedBackend {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn connect(&mut self) -> ConnectOutcome {
        ConnectOutcome::connected("Virtual light ready")
    }

    async fn disconnect(&mut self) {}

    async fn is_alive(&mut self) -> bool {
        true
    }

    async fn set_color(&mut self, red: u8, green: u8, blue: u8) -> bool {
        self.show(SimulatedLight::Color { red, green, blue })
    }

    async fn turn_off(&mut self) -> bool {
        self.show(SimulatedLight::Off)
    }
}
