//! Providers building the daemon's shared state and services.

pub mod app_state;
pub mod instance;
pub mod scheduler;
pub mod traits;

pub use app_state::AppStateProvider;
pub use instance::InstanceGuardServiceProvider;
pub use scheduler::ScheduleServiceProvider;
pub use traits::{AsyncProvider, ServiceProvider};
