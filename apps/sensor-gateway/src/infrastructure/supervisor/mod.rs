//! Process Supervisor
//!
//! Owns the long-running tasks (Request API, stream server, broadcast loop)
//! and drives graceful shutdown:
//!
//! 1. Wait for the shutdown signal (SIGINT / SIGTERM)
//! 2. Cancel the shared [`CancellationToken`]
//! 3. Join every task, aborting whatever is left after the shutdown timeout
//!
//! A task that ends before shutdown is logged; the others keep running.

use std::future::Future;
use std::time::Duration;

use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// How the supervised tasks ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks that finished on their own.
    pub completed: usize,
    /// Tasks that panicked.
    pub panicked: usize,
    /// Tasks aborted after the shutdown timeout.
    pub aborted: usize,
}

/// Named task set sharing one cancellation token.
pub struct Supervisor {
    cancel: CancellationToken,
    tasks: JoinSet<&'static str>,
    shutdown_timeout: Duration,
}

impl Supervisor {
    /// Create a supervisor that cancels `cancel` on shutdown.
    #[must_use]
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            tasks: JoinSet::new(),
            shutdown_timeout: SHUTDOWN_TIMEOUT,
        }
    }

    /// Override the shutdown timeout.
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Token cancelled when shutdown begins.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn a named task.
    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::debug!(task = name, "Spawning task");
        self.tasks.spawn(async move {
            task.await;
            name
        });
    }

    /// Run until `shutdown` resolves, then cancel and join every task.
    pub async fn run_until<S>(mut self, shutdown: S) -> ShutdownReport
    where
        S: Future<Output = ()>,
    {
        let mut report = ShutdownReport::default();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    match joined {
                        Ok(name) => {
                            report.completed += 1;
                            tracing::error!(task = name, "Task exited before shutdown");
                        }
                        Err(e) => {
                            report.panicked += 1;
                            tracing::error!(error = %e, "Task panicked");
                        }
                    }
                }
            }
        }

        self.cancel.cancel();
        tracing::info!(
            timeout_secs = self.shutdown_timeout.as_secs(),
            tasks = self.tasks.len(),
            "Graceful shutdown started"
        );

        let drained = tokio::time::timeout(self.shutdown_timeout, async {
            while let Some(joined) = self.tasks.join_next().await {
                match joined {
                    Ok(name) => {
                        report.completed += 1;
                        tracing::debug!(task = name, "Task stopped");
                    }
                    Err(e) => {
                        report.panicked += 1;
                        tracing::error!(error = %e, "Task panicked during shutdown");
                    }
                }
            }
        })
        .await;

        if drained.is_err() {
            report.aborted = self.tasks.len();
            tracing::warn!(remaining = report.aborted, "Shutdown timed out, aborting tasks");
            self.tasks.shutdown().await;
        }

        report
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::oneshot;

    use super::*;

    #[tokio::test]
    async fn cancels_and_joins_cooperative_tasks() {
        let cancel = CancellationToken::new();
        let mut supervisor = Supervisor::new(cancel.clone());
        for name in ["a", "b", "c"] {
            let token = supervisor.cancel_token();
            supervisor.spawn(name, async move { token.cancelled().await });
        }

        let (tx, rx) = oneshot::channel::<()>();
        let run = tokio::spawn(supervisor.run_until(async move {
            let _ = rx.await;
        }));
        tx.send(()).unwrap();

        let report = run.await.unwrap();
        assert!(cancel.is_cancelled());
        assert_eq!(
            report,
            ShutdownReport {
                completed: 3,
                panicked: 0,
                aborted: 0
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn aborts_tasks_that_ignore_cancellation() {
        let mut supervisor =
            Supervisor::new(CancellationToken::new()).with_shutdown_timeout(Duration::from_secs(1));
        supervisor.spawn("stuck", std::future::pending());
        let token = supervisor.cancel_token();
        supervisor.spawn("polite", async move { token.cancelled().await });

        let report = supervisor.run_until(async {}).await;
        assert_eq!(report.completed, 1);
        assert_eq!(report.aborted, 1);
    }

    #[tokio::test]
    async fn early_exit_does_not_stop_others() {
        let mut supervisor = Supervisor::new(CancellationToken::new());
        supervisor.spawn("short-lived", async {});
        let token = supervisor.cancel_token();
        supervisor.spawn("long-lived", async move { token.cancelled().await });

        let report = supervisor
            .run_until(tokio::time::sleep(Duration::from_millis(50)))
            .await;
        assert_eq!(report.completed, 2);
        assert_eq!(report.aborted, 0);
    }

    #[tokio::test]
    async fn panicking_task_is_reported() {
        let mut supervisor = Supervisor::new(CancellationToken::new());
        supervisor.spawn("boom", async { panic!("task failure") });

        let report = supervisor
            .run_until(tokio::time::sleep(Duration::from_millis(50)))
            .await;
        assert_eq!(report.panicked, 1);
    }
}
