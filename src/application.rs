//! Application entry point and builder.

use std::sync::Arc;

use anyhow::{Result, anyhow};

use crate::{
    coordinator::SystemCoordinator, drivers::hid_io::HidBus, instance::InstanceGuard,
    store::ConfigStore,
};

/// The daemon: shared store, instance lock and the coordinator running the
/// services.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use blyncd::{
///     application::Application,
///     instance::{Acquisition, InstanceGuard, DEFAULT_LOCK_PORT},
///     store::ConfigStore,
/// };
///
/// # async fn example() -> anyhow::Result<()> {
/// let store = Arc::new(ConfigStore::open("/tmp/blyncd").await?);
/// if let Acquisition::Acquired(guard) = InstanceGuard::acquire(DEFAULT_LOCK_PORT)? {
///     Application::builder()
///         .with_store(store)
///         .with_instance_guard(guard)
///         .build()?
///         .run()
///         .await?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct Application {
    pub coordinator: SystemCoordinator,
    store: Arc<ConfigStore>,
    guard: Option<InstanceGuard>,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::default()
    }

    /// Initializes, starts the services and runs until shutdown.
    pub async fn run(&mut self) -> Result<()> {
        self.coordinator
            .initialize(self.store.clone(), self.guard.take())
            .await?;
        self.coordinator.start_all_services().await?;
        self.coordinator.run_main_loop().await
    }
}

#[derive(Default)]
pub struct ApplicationBuilder {
    store: Option<Arc<ConfigStore>>,
    guard: Option<InstanceGuard>,
    hid_bus: Option<Arc<dyn HidBus>>,
}

impl ApplicationBuilder {
    pub fn with_store(mut self, store: Arc<ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_instance_guard(mut self, guard: InstanceGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn with_hid_bus(mut self, bus: Arc<dyn HidBus>) -> Self {
        self.hid_bus = Some(bus);
        self
    }

    pub fn build(self) -> Result<Application> {
        let store = self
            .store
            .ok_or_else(|| anyhow!("Settings store is required"))?;

        let mut coordinator = SystemCoordinator::new();
        if let Some(bus) = self.hid_bus {
            coordinator = coordinator.with_hid_bus(bus);
        }

        Ok(Application {
            coordinator,
            store,
            guard: self.guard,
        })
    }
}
