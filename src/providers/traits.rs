use anyhow::Result;
use async_trait::async_trait;

use crate::task_manager::TaskManager;

/// Builds a component that needs async initialization.
///
/// # Example
///
/// ```no_run
/// use blyncd::providers::traits::AsyncProvider;
///
/// struct PortProvider;
///
/// #[async_trait::async_trait]
/// impl AsyncProvider<u16> for PortProvider {
///     async fn provide(&self) -> anyhow::Result<u16> {
///         Ok(8989)
///     }
/// }
/// ```
#[async_trait]
pub trait AsyncProvider<T> {
    async fn provide(&self) -> Result<T>;
}

/// A long-running service started through the [`TaskManager`].
///
/// Services start in descending priority. A critical service that fails to
/// start aborts startup; any other failure is logged and skipped.
///
/// # Example
///
/// ```no_run
/// use blyncd::providers::traits::ServiceProvider;
/// use blyncd::task_manager::TaskManager;
/// use anyhow::Result;
///
/// struct Heartbeat;
///
/// #[async_trait::async_trait]
/// impl ServiceProvider for Heartbeat {
///     async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
///         task_manager.spawn_task("heartbeat", |token| async move {
///             token.cancelled().await;
///             Ok(())
///         });
///         Ok(())
///     }
///
///     fn name(&self) -> &'static str { "Heartbeat" }
/// }
/// ```
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()>;

    fn name(&self) -> &'static str;

    /// Startup priority, higher starts first.
    fn priority(&self) -> i32 {
        0
    }

    fn is_critical(&self) -> bool {
        false
    }
}
