//! Cycle scheduling
//!
//! Runs the orchestrator once, or on a fixed interval with the first cycle
//! starting immediately, until shutdown is signalled.

use super::{CycleContext, CycleStatus, Orchestrator};
use crate::config::EngineConfig;
use crate::outcome::CycleReport;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

/// Drives batch cycles on a fixed interval
pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    config: Arc<EngineConfig>,
    namespace: Option<String>,
}

impl Scheduler {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        config: Arc<EngineConfig>,
        namespace: Option<String>,
    ) -> Self {
        Self {
            orchestrator,
            config,
            namespace,
        }
    }

    fn context(&self) -> CycleContext {
        CycleContext::new(self.config.clone(), self.namespace.clone())
    }

    /// Run a single cycle
    ///
    /// A shutdown signal lets in-flight entities finish and starts no new ones.
    pub async fn run_once(&self, shutdown: broadcast::Receiver<()>) -> Option<CycleReport> {
        let (cancel, _forward) = forward_shutdown(shutdown);
        match self.orchestrator.run_cycle(&self.context(), &cancel).await {
            CycleStatus::Completed(report) => Some(report),
            CycleStatus::AlreadyRunning => None,
        }
    }

    /// Run cycles until shutdown; returns the number of completed cycles
    pub async fn run(self, shutdown: broadcast::Receiver<()>) -> u64 {
        info!(
            interval_secs = self.config.collection_interval.as_secs(),
            namespace = self.namespace.as_deref().unwrap_or("*"),
            "Starting collection loop"
        );

        let (mut cancel, _forward) = forward_shutdown(shutdown);
        let mut ticker = interval(self.config.collection_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cycles = 0u64;

        loop {
            let stopping = *cancel.borrow();
            if stopping {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    match self.orchestrator.run_cycle(&self.context(), &cancel).await {
                        CycleStatus::Completed(report) => {
                            cycles += 1;
                            if report.cancelled {
                                break;
                            }
                        }
                        CycleStatus::AlreadyRunning => {
                            warn!("Previous cycle still running, skipping tick");
                        }
                    }
                }
                _ = cancel.changed() => {
                    break;
                }
            }
        }

        info!(cycles, "Shutting down collection loop");
        cycles
    }
}

/// Mirror a broadcast shutdown into a level-triggered flag the orchestrator can poll
fn forward_shutdown(
    mut shutdown: broadcast::Receiver<()>,
) -> (watch::Receiver<bool>, tokio::task::JoinHandle<()>) {
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        // A closed channel means every sender is gone; treat it as shutdown
        let _ = shutdown.recv().await;
        let _ = tx.send(true);
    });
    (rx, handle)
}

/// Builder for the scheduler
pub struct SchedulerBuilder {
    orchestrator: Option<Arc<Orchestrator>>,
    config: EngineConfig,
    namespace: Option<String>,
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self {
            orchestrator: None,
            config: EngineConfig::default(),
            namespace: None,
        }
    }

    pub fn orchestrator(mut self, orchestrator: Arc<Orchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the pause between cycles
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.collection_interval = interval;
        self
    }

    /// Restrict every cycle to one namespace
    pub fn namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn build(self) -> Result<Scheduler> {
        let orchestrator = self
            .orchestrator
            .ok_or_else(|| anyhow::anyhow!("Orchestrator is required"))?;
        self.config
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid engine configuration: {}", e))?;

        Ok(Scheduler::new(
            orchestrator,
            Arc::new(self.config),
            self.namespace,
        ))
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
