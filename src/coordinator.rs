//! Service lifecycle: startup in priority order, the main event loop and
//! graceful shutdown.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, error, info, warn};
use tokio::{
    signal::unix::{SignalKind, signal},
    sync::broadcast::error::RecvError,
};

use crate::{
    app_context::AppState,
    drivers::hid_io::HidBus,
    event::{Event, EventBus},
    instance::InstanceGuard,
    providers::{
        AppStateProvider, AsyncProvider, InstanceGuardServiceProvider, ScheduleServiceProvider,
        ServiceProvider,
    },
    store::ConfigStore,
    task_manager::TaskManager,
};

/// Owns the services and drives them from startup to shutdown.
///
/// Critical services must start; a failing optional service is logged and
/// skipped. Shutdown is triggered by Ctrl-C, SIGTERM or a
/// [`Event::SystemShutdown`] on the bus.
pub struct SystemCoordinator {
    task_manager: TaskManager,
    event_bus: EventBus,
    shared_state: Option<Arc<AppState>>,
    service_providers: Vec<Box<dyn ServiceProvider>>,
    hid_bus: Option<Arc<dyn HidBus>>,
}

impl Default for SystemCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCoordinator {
    pub fn new() -> Self {
        Self {
            task_manager: TaskManager::new(),
            event_bus: EventBus::new(),
            shared_state: None,
            service_providers: Vec::new(),
            hid_bus: None,
        }
    }

    /// Looks for lights on `bus` instead of the system HID subsystem.
    pub fn with_hid_bus(mut self, bus: Arc<dyn HidBus>) -> Self {
        self.hid_bus = Some(bus);
        self
    }

    /// Builds the shared state and registers the services.
    ///
    /// Without a `guard` the daemon runs without holding the instance lock.
    pub async fn initialize(
        &mut self,
        store: Arc<ConfigStore>,
        guard: Option<InstanceGuard>,
    ) -> Result<()> {
        info!("Initializing SystemCoordinator...");

        let mut provider = AppStateProvider::new(store, self.event_bus.clone());
        if let Some(bus) = &self.hid_bus {
            provider = provider.with_bus(bus.clone());
        }
        let state = provider
            .provide()
            .await
            .context("Failed to initialize application state")?;
        self.shared_state = Some(state.clone());

        let mut providers: Vec<Box<dyn ServiceProvider>> = vec![Box::new(
            ScheduleServiceProvider::new(state, self.event_bus.clone()),
        )];
        match guard {
            Some(guard) => providers.push(Box::new(InstanceGuardServiceProvider::new(guard))),
            None => warn!("Running without the instance lock"),
        }

        providers.sort_by_key(|p| std::cmp::Reverse(p.priority()));
        self.service_providers = providers;

        info!(
            "Registered {} service providers in priority order",
            self.service_providers.len()
        );
        Ok(())
    }

    /// Starts all registered services in priority order.
    pub async fn start_all_services(&mut self) -> Result<()> {
        for provider in &self.service_providers {
            match provider.start(&mut self.task_manager).await {
                Ok(()) => info!(
                    "Service '{}' started (priority: {}, critical: {})",
                    provider.name(),
                    provider.priority(),
                    provider.is_critical()
                ),
                Err(e) if provider.is_critical() => {
                    return Err(e).with_context(|| {
                        format!("Critical service '{}' failed to start", provider.name())
                    });
                }
                Err(e) => warn!(
                    "Non-critical service '{}' failed to start: {e:#}",
                    provider.name()
                ),
            }
        }
        Ok(())
    }

    /// Runs until a shutdown is requested, then shuts down.
    pub async fn run_main_loop(&mut self) -> Result<()> {
        let mut event_rx = self.event_bus.subscribe();
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
        info!("Starting main event loop");

        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.map_err(|e| anyhow!("Failed to listen for shutdown signal: {e}"))?;
                    info!("Received Ctrl+C, initiating graceful shutdown...");
                    break;
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown...");
                    break;
                }
                event = event_rx.recv() => {
                    if !self.handle_event(event)? {
                        break;
                    }
                }
            }
        }

        self.shutdown().await;
        info!("Main event loop terminated");
        Ok(())
    }

    /// Returns whether the loop should keep running.
    fn handle_event(&self, event: Result<Event, RecvError>) -> Result<bool> {
        match event {
            Ok(Event::SystemShutdown) => {
                info!("Processing SystemShutdown event");
                return Ok(false);
            }
            Ok(Event::SimulatedLight(light)) => info!("Virtual light: {light}"),
            Ok(Event::HealthChanged(health)) => {
                debug!("Device health: {} ({})", health.code, health.message);
            }
            Ok(event) => debug!("Received event: {event:?}"),
            Err(RecvError::Lagged(n)) => warn!("Event bus lagged by {n} messages"),
            Err(RecvError::Closed) => bail!("Event bus channel closed unexpectedly"),
        }
        Ok(true)
    }

    /// Stops every service, then switches the light off if configured to.
    async fn shutdown(&mut self) {
        info!("Initiating graceful shutdown...");

        if let Err(e) = self.task_manager.shutdown_all().await {
            error!("Error during task shutdown: {e:#}");
        }

        if let Some(state) = &self.shared_state {
            if state.config().await.turn_off_on_exit {
                let mut devices = state.devices.lock().await;
                if devices.turn_off().await {
                    info!("Light switched off");
                } else {
                    debug!("No light to switch off");
                }
            }
        }

        info!("Shutdown complete");
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn shared_state(&self) -> Option<&Arc<AppState>> {
        self.shared_state.as_ref()
    }

    pub fn running_services(&self) -> Vec<&'static str> {
        self.service_providers.iter().map(|p| p.name()).collect()
    }
}
