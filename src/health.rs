//! Device connection health record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse connection state of the light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCode {
    /// No scan has completed yet.
    Searching,
    /// A hardware backend is driving the light.
    Connected,
    /// No hardware answered; the simulated backend is active.
    NotDetected,
}

impl fmt::Display for HealthCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HealthCode::Searching => "searching",
            HealthCode::Connected => "connected",
            HealthCode::NotDetected => "not_detected",
        })
    }
}

/// Externally visible connection status, published to `status.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceHealth {
    pub code: HealthCode,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl DeviceHealth {
    pub fn new(code: HealthCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Initial record before the first scan.
    pub fn searching() -> Self {
        Self::new(HealthCode::Searching, "Initializing...")
    }

    /// Whether the record already says this, ignoring when it was taken.
    pub fn describes(&self, code: HealthCode, message: &str) -> bool {
        self.code == code && self.message == message
    }
}
