use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, Utc};
use log::{debug, info, warn};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    app_context::AppState,
    config::StatusLabel,
    event::{Event, EventBus},
    health::{DeviceHealth, HealthCode},
    providers::traits::ServiceProvider,
    schedule,
    task_manager::TaskManager,
};

/// Schedule service provider.
///
/// Polls the shared settings, keeps the device connection healthy and shows
/// the status the schedule resolves to. This is the daemon's core loop.
///
/// - **Priority**: 10
/// - **Critical**: Yes
pub struct ScheduleServiceProvider {
    state: Arc<AppState>,
    event_bus: EventBus,
}

impl ScheduleServiceProvider {
    pub fn new(state: Arc<AppState>, event_bus: EventBus) -> Self {
        Self { state, event_bus }
    }
}

#[async_trait]
impl ServiceProvider for ScheduleServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let state = self.state.clone();
        let event_bus = self.event_bus.clone();

        task_manager.spawn_task(self.name(), |cancel_token| async move {
            run_schedule_service(state, event_bus, cancel_token).await
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ScheduleService"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn is_critical(&self) -> bool {
        true
    }
}

async fn run_schedule_service(
    state: Arc<AppState>,
    event_bus: EventBus,
    cancel_token: CancellationToken,
) -> Result<()> {
    state.devices.lock().await.connect().await;
    let mut schedule = ScheduleLoop::new(state.clone(), event_bus);

    loop {
        if cancel_token.is_cancelled() {
            break;
        }

        schedule.tick(Local::now().naive_local()).await;

        // Re-read every round so a changed poll interval applies right away.
        let pause = state.store.poll_interval().await;
        tokio::select! {
            () = cancel_token.cancelled() => break,
            () = sleep(pause) => {}
        }
    }

    info!("Schedule service stopped");
    Ok(())
}

/// One polling round at a time, remembering what the light shows.
pub struct ScheduleLoop {
    state: Arc<AppState>,
    event_bus: EventBus,
    current: Option<StatusLabel>,
    health: Option<DeviceHealth>,
    manual_override: Option<Option<StatusLabel>>,
}

impl ScheduleLoop {
    pub fn new(state: Arc<AppState>, event_bus: EventBus) -> Self {
        Self {
            state,
            event_bus,
            current: None,
            health: None,
            manual_override: None,
        }
    }

    /// Status currently shown, `None` before the first successful update.
    pub fn current(&self) -> Option<StatusLabel> {
        self.current
    }

    /// Runs one polling round for `now`.
    ///
    /// Returns the status written to the light, or `None` when nothing had to
    /// change. A write that fails leaves the remembered status alone so the
    /// next round tries again.
    pub async fn tick(&mut self, now: NaiveDateTime) -> Option<StatusLabel> {
        let state = self.state.clone();
        let store = &state.store;
        if store.reload().await {
            debug!("Settings changed on disk");
        }
        if let Err(e) = store.mark_polled(Utc::now()).await {
            warn!("Failed to record poll time: {e:#}");
        }

        let mut devices = state.devices.lock().await;
        let health = devices.get_connection_status().await;
        let switched = self.track_health(health);

        let config = store.config().await;
        if self.manual_override != Some(config.manual_override) {
            if self.manual_override.is_some() {
                info!(
                    "Manual override: {}",
                    config.manual_override.map_or("none", StatusLabel::as_str)
                );
            }
            self.manual_override = Some(config.manual_override);
            self.publish(Event::OverrideChanged(config.manual_override));
        }

        let desired = schedule::resolve(&now, &config);
        let transition = self.current != Some(desired);
        if !transition && !switched {
            return None;
        }

        if !devices.set_status(desired).await {
            warn!("Failed to show status '{desired}'");
            return None;
        }

        if transition {
            info!(
                "Status: {} -> {desired}",
                self.current.map_or("none", StatusLabel::as_str)
            );
            self.publish(Event::StatusChanged {
                from: self.current,
                to: desired,
            });
            self.current = Some(desired);
        } else {
            info!("Re-applied status '{desired}' after the light changed");
        }
        Some(desired)
    }

    /// Records `health`; returns whether the light behind it changed, so the
    /// current status has to be shown again.
    fn track_health(&mut self, health: DeviceHealth) -> bool {
        let Some(last) = &self.health else {
            self.publish(Event::HealthChanged(health.clone()));
            self.health = Some(health);
            return false;
        };
        if last.describes(health.code, &health.message) {
            return false;
        }

        let switched = last.code != health.code || health.code == HealthCode::Connected;
        self.publish(Event::HealthChanged(health.clone()));
        self.health = Some(health);
        switched
    }

    fn publish(&self, event: Event) {
        if self.event_bus.publish(event).is_err() {
            debug!("No subscribers for schedule event");
        }
    }
}
