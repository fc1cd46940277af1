//! Concurrent fleet simulation.
//!
//! This module runs one simulation per train with:
//! - Bounded parallelism (semaphore permits, one task per train)
//! - Failure isolation: a train that errors or panics is dropped, the batch continues
//! - Results collected in completion order
//! - Cooperative cancellation of in-flight provider calls and pacing delays

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, Semaphore};

use crate::directions::DirectionsProvider;
use crate::error::{Result, TrackError};
use crate::{
    FleetResult, Route, RouteSource, RouteStrategy, SimulationConfig, TrainDescriptor,
    TrainFailure, Trajectory, TrajectorySimulator,
};

/// Progress callback type: `(completed, total)` after each train finishes.
pub type ProgressCallback = Arc<dyn Fn(u32, u32) + Send + Sync>;

/// Configuration for a fleet run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Upper bound on simultaneously active simulations.
    /// Default: 10
    pub max_concurrent_trains: usize,

    /// Speed and sampling interval.
    pub simulation: SimulationConfig,

    /// How each train's raw route is obtained.
    /// Default: direct provider request
    pub strategy: RouteStrategy,

    /// Artificial delay after each emitted sample, to mimic real-time
    /// progress for downstream consumers. Zero disables pacing.
    /// Default: 0
    pub pacing_ms: u64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            max_concurrent_trains: 10,
            simulation: SimulationConfig::default(),
            strategy: RouteStrategy::Direct,
            pacing_ms: 0,
        }
    }
}

impl FleetConfig {
    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: FleetConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_trains == 0 {
            return Err(TrackError::ConfigError {
                message: "max_concurrent_trains must be at least 1".to_string(),
            });
        }
        self.simulation.validate()
    }
}

#[derive(Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation shared between a caller and a running batch.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel is not missed
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Runs trajectory simulations for many trains in parallel.
pub struct FleetRunner<P> {
    source: RouteSource<P>,
    simulator: TrajectorySimulator,
    config: FleetConfig,
    progress: Option<ProgressCallback>,
}

impl<P: DirectionsProvider> FleetRunner<P> {
    pub fn new(source: RouteSource<P>, config: FleetConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            simulator: TrajectorySimulator::new(config.simulation)?,
            config,
            progress: None,
        })
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    /// Simulate every train; blocks until all have completed or failed.
    pub async fn run(&self, trains: Vec<TrainDescriptor>, start_time: DateTime<Utc>) -> FleetResult {
        self.run_with_cancel(trains, start_time, CancelToken::new())
            .await
    }

    /// [`run`](Self::run), stopping early when `cancel` fires.
    ///
    /// Trajectories that completed before cancellation are still returned;
    /// unfinished trains are reported as cancelled failures.
    pub async fn run_with_cancel(
        &self,
        trains: Vec<TrainDescriptor>,
        start_time: DateTime<Utc>,
        cancel: CancelToken,
    ) -> FleetResult {
        let total = trains.len() as u32;
        let completed = Arc::new(AtomicU32::new(0));
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_trains));
        let pacing = Duration::from_millis(self.config.pacing_ms);

        info!(
            "[FleetRunner] Simulating {} trains with {} concurrent workers",
            total, self.config.max_concurrent_trains
        );

        let start = Instant::now();

        let mut tasks: FuturesUnordered<_> = trains
            .into_iter()
            .map(|train| {
                let train_id = train.id.clone();
                let source = self.source.clone();
                let simulator = self.simulator.clone();
                let strategy = self.config.strategy;
                let semaphore = Arc::clone(&semaphore);
                let completed = Arc::clone(&completed);
                let callback = self.progress.clone();
                let cancel = cancel.clone();

                let handle = tokio::spawn(async move {
                    let outcome = match semaphore.acquire_owned().await {
                        Ok(_permit) => {
                            simulate_one(&source, &simulator, strategy, &train, start_time, pacing, &cancel)
                                .await
                        }
                        Err(_) => Err(TrackError::Internal {
                            message: "worker pool closed".to_string(),
                        }),
                    };

                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(ref cb) = callback {
                        cb(done, total);
                    }

                    outcome
                });

                async move { (train_id, handle.await) }
            })
            .collect();

        // Collect in arrival order
        let mut result = FleetResult::default();
        while let Some((train_id, joined)) = tasks.next().await {
            match joined {
                Ok(Ok(Some(trajectory))) => result.trajectories.push(trajectory),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    warn!("[FleetRunner] Train {} failed: {}", train_id, e);
                    result.failures.push(TrainFailure {
                        train_id,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!("[FleetRunner] Task join error for {}: {}", train_id, e);
                    result.failures.push(TrainFailure {
                        train_id,
                        reason: format!("Task error: {}", e),
                    });
                }
            }
        }

        let elapsed = start.elapsed();
        if result.is_empty() {
            warn!(
                "[FleetRunner] No usable routes: 0 of {} trains produced a trajectory ({:.2}s)",
                total,
                elapsed.as_secs_f64()
            );
        } else {
            info!(
                "[FleetRunner] Completed: {}/{} trains, {} samples in {:.2}s",
                result.len(),
                total,
                result.sample_count(),
                elapsed.as_secs_f64()
            );
        }

        result
    }

    /// Synchronous wrapper - runs the batch on a fresh tokio runtime.
    pub fn run_blocking(
        &self,
        trains: Vec<TrainDescriptor>,
        start_time: DateTime<Utc>,
    ) -> Result<FleetResult> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| TrackError::Internal {
                message: format!("Failed to create tokio runtime: {}", e),
            })?;
        Ok(rt.block_on(self.run(trains, start_time)))
    }
}

/// One train: fetch its route, then sample it.
///
/// `Ok(None)` means there was nothing to simulate (empty or single-point
/// route); that is logged but not a failure.
async fn simulate_one<P: DirectionsProvider>(
    source: &RouteSource<P>,
    simulator: &TrajectorySimulator,
    strategy: RouteStrategy,
    train: &TrainDescriptor,
    start_time: DateTime<Utc>,
    pacing: Duration,
    cancel: &CancelToken,
) -> Result<Option<Trajectory>> {
    if cancel.is_cancelled() {
        return Err(TrackError::Cancelled);
    }

    debug!("[FleetRunner] Simulating route: {}", train.id);

    let route = tokio::select! {
        route = source.route_for(train, strategy) => route,
        _ = cancel.cancelled() => return Err(TrackError::Cancelled),
    };

    if route.len() < 2 {
        let reason = TrackError::DegenerateRoute {
            train_id: train.id.clone(),
            point_count: route.len(),
        };
        info!("[FleetRunner] Skipping: {}", reason);
        return Ok(None);
    }

    if pacing.is_zero() {
        return Ok(Some(simulator.simulate_train(train, &route, start_time)));
    }

    let mut samples = Vec::new();
    let mut sampler = simulator.samples(&route, start_time).peekable();
    while let Some(sample) = sampler.next() {
        debug!(
            "[FleetRunner] Train {} at ({:.5}, {:.5}) at {}",
            train.id, sample.position.latitude, sample.position.longitude, sample.timestamp
        );
        samples.push(sample);
        // The arrival sample completes the train; no pacing delay after it
        if sampler.peek().is_none() {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(pacing) => {}
            _ = cancel.cancelled() => return Err(TrackError::Cancelled),
        }
    }

    Ok(Some(
        Trajectory {
            train_id: train.id.clone(),
            start_time,
            samples,
            name: None,
            origin: None,
            destination: None,
        }
        .with_descriptor(train),
    ))
}

/// Simulate trains whose routes were already fetched.
///
/// CPU-only; uses rayon when the `parallel` feature is enabled. Trains with
/// fewer than two route points are skipped.
pub fn simulate_batch(
    simulator: &TrajectorySimulator,
    routes: &[(TrainDescriptor, Route)],
    start_time: DateTime<Utc>,
) -> FleetResult {
    #[cfg(feature = "parallel")]
    use rayon::prelude::*;

    #[cfg(feature = "parallel")]
    let iter = routes.par_iter();
    #[cfg(not(feature = "parallel"))]
    let iter = routes.iter();

    let trajectories: Vec<Trajectory> = iter
        .filter_map(|(train, route)| {
            if route.len() < 2 {
                debug!("[simulate_batch] Skipping {}: route has {} points", train.id, route.len());
                return None;
            }
            Some(simulator.simulate_train(train, route, start_time))
        })
        .collect();

    if trajectories.is_empty() {
        warn!("[simulate_batch] No usable routes among {} trains", routes.len());
    }

    FleetResult {
        trajectories,
        failures: Vec::new(),
    }
}
