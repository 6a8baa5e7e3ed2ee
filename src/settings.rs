//! Operations a settings front end performs on the shared store.
//!
//! Everything here goes through [`ConfigStore`], so the running daemon picks
//! changes up on its next poll without any direct connection to it.

use std::{fmt, sync::Arc};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    config::{Config, Rule, StatusLabel},
    health::DeviceHealth,
    schedule,
    store::ConfigStore,
};

/// Schedule submitted by an editor. The manual override is never part of it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScheduleUpdate {
    #[serde(default = "default_state")]
    pub default_state: StatusLabel,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

fn default_state() -> StatusLabel {
    StatusLabel::Away
}

impl ScheduleUpdate {
    /// Parses an editor submission, rejecting rules the schedule cannot use.
    pub fn from_json(raw: &str) -> Result<Self> {
        let update: Self = serde_json::from_str(raw).context("Invalid schedule document")?;
        update.validate()?;
        Ok(update)
    }

    pub fn validate(&self) -> Result<()> {
        for (idx, rule) in self.rules.iter().enumerate() {
            if rule.window().is_none() {
                bail!(
                    "Rule #{}: times must be HH:MM, got '{}'-'{}'",
                    idx + 1,
                    rule.start,
                    rule.end
                );
            }
        }
        Ok(())
    }
}

/// Everything a settings view shows.
#[derive(Debug, Clone, Serialize)]
pub struct SettingsSnapshot {
    #[serde(flatten)]
    pub config: Config,
    pub device_status: Option<DeviceHealth>,
    pub last_polling_time: Option<DateTime<Utc>>,
    /// Status the schedule resolves to at the time of the snapshot.
    pub current_status: StatusLabel,
}

impl SettingsSnapshot {
    /// Short human-readable report.
    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SettingsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = if self.config.manual_override.is_some() {
            "manual override"
        } else {
            "schedule"
        };
        writeln!(f, "Status: {} ({source})", self.current_status)?;

        match &self.device_status {
            Some(health) => writeln!(f, "Device: {} - {}", health.code, health.message)?,
            None => writeln!(f, "Device: unknown (daemon has not reported yet)")?,
        }
        match self.last_polling_time {
            Some(at) => writeln!(
                f,
                "Last poll: {}",
                at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            )?,
            None => writeln!(f, "Last poll: never")?,
        }
        writeln!(
            f,
            "Rules: {} ({} enabled), default '{}', polling every {}s",
            self.config.rules.len(),
            self.config.rules.iter().filter(|r| r.enabled).count(),
            self.config.default_state,
            self.config.poll_seconds
        )
    }
}

/// Settings operations over a shared store.
pub struct SettingsClient {
    store: Arc<ConfigStore>,
}

impl SettingsClient {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }

    pub async fn snapshot(&self, now: NaiveDateTime) -> SettingsSnapshot {
        let config = self.store.config().await;
        SettingsSnapshot {
            current_status: schedule::resolve(&now, &config),
            device_status: self.store.device_status().await,
            last_polling_time: self.store.last_polled().await,
            config,
        }
    }

    /// Replaces the schedule, keeping whatever override is on disk.
    pub async fn save_schedule(&self, update: ScheduleUpdate) -> Result<bool> {
        update.validate()?;
        let changed = self
            .store
            .save_schedule(update.default_state, update.rules)
            .await?;
        if changed {
            info!("Schedule saved");
        }
        Ok(changed)
    }

    pub async fn force(&self, label: StatusLabel) -> Result<bool> {
        info!("Forcing status '{label}'");
        self.store.set_manual_override(Some(label)).await
    }

    /// Clears the override so the schedule applies again.
    pub async fn resume(&self) -> Result<bool> {
        info!("Resuming schedule");
        self.store.set_manual_override(None).await
    }

    pub async fn set_poll_seconds(&self, seconds: u64) -> Result<bool> {
        if seconds == 0 {
            bail!("Polling interval must be at least one second");
        }
        self.store.update(|config| config.poll_seconds = seconds).await
    }

    pub async fn set_turn_off_on_exit(&self, enabled: bool) -> Result<bool> {
        self.store
            .update(|config| config.turn_off_on_exit = enabled)
            .await
    }

    /// Records the preference only; registering with the session is left to
    /// the desktop environment.
    pub async fn set_start_on_login(&self, enabled: bool) -> Result<bool> {
        self.store
            .update(|config| config.start_on_login = enabled)
            .await
    }
}
