//! Background worker that periodically replays the retry store.
//!
//! Join handles are tracked, cancellation is explicit, and every pass is
//! wrapped in a timeout. Each finished pass publishes its
//! [`ReplaySummary`] on a watch channel.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use mailwire_infra::sync::{ReplayWorker, ReplayWorkerConfig};
//!
//! # async fn example(client: mailwire_core::Client) -> Result<(), Box<dyn std::error::Error>> {
//! let replayer = client.replayer().ok_or("no retry store configured")?;
//! let mut worker = ReplayWorker::new(
//!     Arc::new(replayer),
//!     ReplayWorkerConfig { interval: Duration::from_secs(300), ..Default::default() },
//! );
//!
//! worker.start()?;
//! // ... application runs ...
//! worker.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use mailwire_core::{ReplaySummary, Replayer};
use mailwire_domain::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::errors::WorkerError;

/// Configuration for the replay worker.
#[derive(Debug, Clone)]
pub struct ReplayWorkerConfig {
    /// Delay between replay passes
    pub interval: Duration,
    /// Upper bound for one pass
    pub pass_timeout: Duration,
    /// Join timeout when stopping
    pub join_timeout: Duration,
}

impl Default for ReplayWorkerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            pass_timeout: Duration::from_secs(120),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Replay worker with explicit lifecycle management.
pub struct ReplayWorker {
    replayer: Arc<Replayer>,
    config: ReplayWorkerConfig,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
    summaries: watch::Sender<Option<ReplaySummary>>,
}

impl ReplayWorker {
    pub fn new(replayer: Arc<Replayer>, config: ReplayWorkerConfig) -> Self {
        let (summaries, _) = watch::channel(None);
        Self {
            replayer,
            config,
            cancellation: CancellationToken::new(),
            task_handle: None,
            summaries,
        }
    }

    /// Receiver that sees the summary of every finished pass.
    pub fn subscribe(&self) -> watch::Receiver<Option<ReplaySummary>> {
        self.summaries.subscribe()
    }

    /// Summary of the most recent pass, if any has finished.
    pub fn last_summary(&self) -> Option<ReplaySummary> {
        *self.summaries.borrow()
    }

    /// Run one pass now, outside the background schedule.
    pub async fn run_once(&self) -> Result<ReplaySummary> {
        let summary = self.replayer.run().await?;
        self.summaries.send_replace(Some(summary));
        Ok(summary)
    }

    /// Start the worker, spawning the background loop.
    ///
    /// # Errors
    /// [`WorkerError::AlreadyRunning`] if the worker was already started.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> std::result::Result<(), WorkerError> {
        if self.is_running() {
            return Err(WorkerError::AlreadyRunning);
        }

        info!(interval_secs = self.config.interval.as_secs(), "Starting replay worker");

        self.cancellation = CancellationToken::new();

        let replayer = Arc::clone(&self.replayer);
        let summaries = self.summaries.clone();
        let config = self.config.clone();
        let cancel = self.cancellation.clone();

        let handle = tokio::spawn(async move {
            Self::replay_loop(replayer, summaries, config, cancel).await;
        });

        self.task_handle = Some(handle);
        Ok(())
    }

    /// Stop the worker and wait for the loop to finish.
    ///
    /// # Errors
    /// [`WorkerError::NotRunning`] if not started, or a join failure.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> std::result::Result<(), WorkerError> {
        if !self.is_running() {
            return Err(WorkerError::NotRunning);
        }

        info!("Stopping replay worker");
        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            match tokio::time::timeout(self.config.join_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("Replay task panicked: {}", e);
                    return Err(WorkerError::Panicked(e.to_string()));
                }
                Err(_) => {
                    warn!("Replay task did not complete within timeout");
                    return Err(WorkerError::JoinTimeout(self.config.join_timeout));
                }
            }
        }

        info!("Replay worker stopped");
        self.cancellation = CancellationToken::new();
        Ok(())
    }

    /// Returns true when the background loop is active.
    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    async fn replay_loop(
        replayer: Arc<Replayer>,
        summaries: watch::Sender<Option<ReplaySummary>>,
        config: ReplayWorkerConfig,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Replay loop cancelled");
                    break;
                }
                () = tokio::time::sleep(config.interval) => {
                    let started = Instant::now();
                    match tokio::time::timeout(config.pass_timeout, replayer.run()).await {
                        Ok(Ok(summary)) => {
                            debug!(
                                elapsed_ms = started.elapsed().as_millis(),
                                remaining = summary.remaining(),
                                "Replay pass completed"
                            );
                            summaries.send_replace(Some(summary));
                        }
                        Ok(Err(e)) => {
                            error!(error = %e, "Replay pass failed");
                        }
                        Err(_) => {
                            warn!(
                                timeout_secs = config.pass_timeout.as_secs(),
                                "Replay pass timed out"
                            );
                        }
                    }
                }
            }
        }
    }
}

impl Drop for ReplayWorker {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("ReplayWorker dropped while running; cancelling task");
            self.cancellation.cancel();
        }
    }
}
