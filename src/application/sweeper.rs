//! Background sweeping of idle limiter entries.
//!
//! Periodically drops per-identifier entries that have not been evaluated
//! within a configured idle time, so high-cardinality limiters (per-IP,
//! per-user) do not grow without bound.

use crate::application::registry::GovernorRegistry;
use crate::domain::config::ConfigError;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::interval;

/// Error returned when shutting down a sweeper task.
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    /// The task ended before it could be signalled
    #[error("sweeper task already stopped")]
    AlreadyStopped,
    /// The task panicked or was aborted
    #[error("sweeper task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

/// Configuration for idle sweeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweeperConfig {
    interval: Duration,
    max_idle: Duration,
}

impl SweeperConfig {
    /// Sweep every `interval`, dropping entries idle for longer than
    /// `max_idle`.
    ///
    /// # Errors
    /// Returns an error if either duration is zero.
    pub fn new(interval: Duration, max_idle: Duration) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::ZeroDuration("sweep interval"));
        }
        if max_idle.is_zero() {
            return Err(ConfigError::ZeroDuration("max_idle"));
        }
        Ok(Self { interval, max_idle })
    }

    /// Time between sweeps.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Idle time after which an entry is dropped.
    pub fn max_idle(&self) -> Duration {
        self.max_idle
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_idle: Duration::from_secs(600),
        }
    }
}

/// Sweeps idle entries out of a registry.
#[derive(Debug, Clone)]
pub struct IdleSweeper {
    registry: GovernorRegistry,
    config: SweeperConfig,
}

impl IdleSweeper {
    /// Create a sweeper over `registry`.
    pub fn new(registry: GovernorRegistry, config: SweeperConfig) -> Self {
        Self { registry, config }
    }

    /// Run one sweep now. Returns how many entries were dropped.
    pub fn sweep_once(&self) -> usize {
        let removed = self.registry.sweep_idle(self.config.max_idle);
        tracing::debug!(removed, "idle sweep finished");
        removed
    }

    /// Start sweeping in a background task.
    ///
    /// The task runs until [`SweeperHandle::shutdown`] is called; dropping
    /// the handle leaves it running. With `sweep_on_shutdown`, one last
    /// sweep runs before the task exits.
    pub fn start(self, sweep_on_shutdown: bool) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let mut ticker = interval(self.config.interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep_once();
                    }
                    signal = &mut shutdown_rx => {
                        if signal.is_err() {
                            // Handle dropped without shutdown: keep sweeping
                            loop {
                                ticker.tick().await;
                                self.sweep_once();
                            }
                        }
                        if sweep_on_shutdown {
                            self.sweep_once();
                        }
                        break;
                    }
                }
            }
        });

        SweeperHandle {
            shutdown_tx: Some(shutdown_tx),
            task,
        }
    }

    /// Sweeper configuration.
    pub fn config(&self) -> &SweeperConfig {
        &self.config
    }
}

/// Handle to a running sweeper task.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Check if the task is still running.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the task to stop and wait for it to exit.
    ///
    /// # Errors
    /// Returns an error if the task had already stopped or panicked.
    pub async fn shutdown(mut self) -> Result<(), ShutdownError> {
        let signalled = self
            .shutdown_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false);
        self.task.await?;
        if signalled {
            Ok(())
        } else {
            Err(ShutdownError::AlreadyStopped)
        }
    }
}
