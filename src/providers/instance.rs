use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{instance::InstanceGuard, providers::traits::ServiceProvider, task_manager::TaskManager};

/// Keeps the instance lock port open for the daemon's lifetime.
///
/// - **Priority**: 20 (starts first)
/// - **Critical**: Yes
pub struct InstanceGuardServiceProvider {
    guard: Mutex<Option<InstanceGuard>>,
}

impl InstanceGuardServiceProvider {
    pub fn new(guard: InstanceGuard) -> Self {
        Self {
            guard: Mutex::new(Some(guard)),
        }
    }
}

#[async_trait]
impl ServiceProvider for InstanceGuardServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let guard = self
            .guard
            .lock()
            .await
            .take()
            .ok_or_else(|| anyhow!("Instance lock already handed to a running task"))?;

        task_manager.spawn_task(self.name(), |cancel_token| async move {
            guard.serve(cancel_token).await;
            Ok(())
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "InstanceGuard"
    }

    fn priority(&self) -> i32 {
        20
    }

    fn is_critical(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{self, Acquisition};
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn guard_is_served_until_shutdown() {
        let Acquisition::Acquired(guard) = InstanceGuard::acquire(0).unwrap() else {
            panic!("fresh port reported as taken");
        };
        let port = guard.port();
        let provider = InstanceGuardServiceProvider::new(guard);
        let mut tasks = TaskManager::new();

        assert_ok!(provider.start(&mut tasks).await);
        assert!(instance::is_running(port).await);
        assert_err!(provider.start(&mut tasks).await);

        assert_ok!(tasks.shutdown_all().await);
        assert!(!instance::is_running(port).await);
    }
}
