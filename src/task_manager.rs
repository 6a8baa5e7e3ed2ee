//! Lifecycle of the daemon's background tasks.

use std::{future::Future, time::Duration};

use anyhow::{Result, anyhow};
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Time each task gets to stop after cancellation before it is aborted.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Owns every spawned service task and stops them together.
///
/// Each task receives a child of the manager's token and is expected to
/// return soon after it is cancelled. Tasks are stopped in the order they
/// were spawned.
#[derive(Debug)]
pub struct TaskManager {
    tasks: Vec<ManagedTask>,
    shutdown: CancellationToken,
    grace: Duration,
}

#[derive(Debug)]
struct ManagedTask {
    name: String,
    handle: JoinHandle<Result<()>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::with_grace(SHUTDOWN_GRACE)
    }

    pub fn with_grace(grace: Duration) -> Self {
        Self {
            tasks: Vec::new(),
            shutdown: CancellationToken::new(),
            grace,
        }
    }

    /// Token cancelled when the manager shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn spawn_task<F, Fut>(&mut self, name: impl Into<String>, task_fn: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        let token = self.shutdown.child_token();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            info!("Starting task: {task_name}");
            let result = task_fn(token).await;
            match &result {
                Ok(()) => info!("Task '{task_name}' finished"),
                Err(e) => error!("Task '{task_name}' failed: {e:#}"),
            }
            result
        });

        self.tasks.push(ManagedTask { name, handle });
    }

    /// Cancels all tasks and waits for them.
    ///
    /// A task that overruns the grace period is aborted. Returns the first
    /// failure after every task has been dealt with.
    pub async fn shutdown_all(&mut self) -> Result<()> {
        info!("Stopping {} tasks", self.tasks.len());
        self.shutdown.cancel();

        let mut first_error = None;
        for ManagedTask { name, mut handle } in self.tasks.drain(..) {
            let failure = match tokio::time::timeout(self.grace, &mut handle).await {
                Ok(Ok(Ok(()))) => None,
                Ok(Ok(Err(e))) => Some(e.context(format!("Task '{name}' failed"))),
                Ok(Err(e)) => Some(anyhow!("Task '{name}' panicked: {e}")),
                Err(_) => {
                    warn!("Task '{name}' did not stop in {:?}, aborting", self.grace);
                    handle.abort();
                    Some(anyhow!("Task '{name}' shutdown timeout exceeded"))
                }
            };
            if let Some(e) = failure {
                error!("{e:#}");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("All tasks stopped");
                Ok(())
            }
        }
    }

    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.tasks
            .iter()
            .any(|task| task.name == name && !task.handle.is_finished())
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}
