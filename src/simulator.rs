//! # Trajectory Simulator
//!
//! Turns a sparse route plus a constant speed into a time-stamped track
//! sampled once per tick (one minute by default).
//!
//! ## Sampling rules
//!
//! For each segment `start -> end` of the route:
//!
//! 1. `required = distance(start, end) / meters_per_tick`.
//! 2. If `required <= 1`, the segment is crossed within one tick: a single
//!    sample is emitted at `start` and the clock moves one tick. The segment
//!    is not subdivided, so consecutive short hops are sampled at their
//!    start vertices only.
//! 3. Otherwise a sample is emitted at fractions `0, 1/required, 2/required, ...`
//!    of the segment (linear interpolation), one tick apart, while the
//!    fraction is below 1.
//!
//! After the last segment one final sample is emitted at the last route
//! point. A route with fewer than two points produces no samples.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackError};
use crate::geo_utils::{haversine_distance, interpolate};
use crate::{GeoPoint, Route, TrainDescriptor, Trajectory, TrajectorySample};

/// Configuration for trajectory sampling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Constant train speed in km/h. Must be finite and positive.
    /// Default: 160.0
    pub speed_kmph: f64,

    /// Sampling interval in seconds. Must be non-zero.
    /// Default: 60
    pub tick_seconds: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            speed_kmph: 160.0,
            tick_seconds: 60,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.speed_kmph.is_finite() || self.speed_kmph <= 0.0 {
            return Err(TrackError::ConfigError {
                message: format!("speed_kmph must be positive, got {}", self.speed_kmph),
            });
        }
        if self.tick_seconds == 0 {
            return Err(TrackError::ConfigError {
                message: "tick_seconds must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    /// Distance covered in one tick, in meters.
    pub fn meters_per_tick(&self) -> f64 {
        self.speed_kmph * 1000.0 / 3600.0 * self.tick_seconds as f64
    }

    pub fn tick(&self) -> Duration {
        Duration::seconds(self.tick_seconds as i64)
    }
}

/// Samples routes into trajectories. Stateless between runs.
#[derive(Debug, Clone)]
pub struct TrajectorySimulator {
    config: SimulationConfig,
}

impl TrajectorySimulator {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Lazily sample `route` starting at `start_time`.
    pub fn samples<'a>(&self, route: &'a Route, start_time: DateTime<Utc>) -> Sampler<'a> {
        Sampler {
            points: route.points(),
            meters_per_tick: self.config.meters_per_tick(),
            tick: self.config.tick(),
            clock: start_time,
            state: SamplerState::Idle,
        }
    }

    /// Sample a whole route. Routes with fewer than two points give an empty
    /// trajectory.
    pub fn simulate(&self, train_id: &str, route: &Route, start_time: DateTime<Utc>) -> Trajectory {
        Trajectory {
            train_id: train_id.to_string(),
            start_time,
            samples: self.samples(route, start_time).collect(),
            name: None,
            origin: None,
            destination: None,
        }
    }

    /// [`simulate`](Self::simulate) with the descriptor's metadata attached.
    pub fn simulate_train(
        &self,
        train: &TrainDescriptor,
        route: &Route,
        start_time: DateTime<Utc>,
    ) -> Trajectory {
        self.simulate(&train.id, route, start_time)
            .with_descriptor(train)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SamplerState {
    Idle,
    Sampling {
        segment: usize,
        step: usize,
        required_ticks: f64,
    },
    Done,
}

/// Iterator over the samples of one route.
///
/// Moves `Idle -> Sampling -> Done`; the clock only ever moves forward.
#[derive(Debug, Clone)]
pub struct Sampler<'a> {
    points: &'a [GeoPoint],
    meters_per_tick: f64,
    tick: Duration,
    clock: DateTime<Utc>,
    state: SamplerState,
}

impl Sampler<'_> {
    fn enter_segment(&self, segment: usize) -> SamplerState {
        let distance = haversine_distance(&self.points[segment], &self.points[segment + 1]);
        SamplerState::Sampling {
            segment,
            step: 0,
            required_ticks: distance / self.meters_per_tick,
        }
    }

    /// State once `segment` is finished; the last index means "arrive".
    fn after_segment(&self, segment: usize) -> SamplerState {
        let last = self.points.len() - 1;
        if segment + 1 == last {
            SamplerState::Sampling {
                segment: last,
                step: 0,
                required_ticks: 0.0,
            }
        } else {
            self.enter_segment(segment + 1)
        }
    }

    fn emit(&mut self, position: GeoPoint) -> TrajectorySample {
        let sample = TrajectorySample {
            position,
            timestamp: self.clock,
        };
        self.clock = self.clock + self.tick;
        sample
    }

    /// Current simulation clock (time of the next sample).
    pub fn clock(&self) -> DateTime<Utc> {
        self.clock
    }
}

impl Iterator for Sampler<'_> {
    type Item = TrajectorySample;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                SamplerState::Idle => {
                    if self.points.len() < 2 {
                        self.state = SamplerState::Done;
                        return None;
                    }
                    self.state = self.enter_segment(0);
                }
                SamplerState::Sampling {
                    segment,
                    step,
                    required_ticks,
                } => {
                    let last = self.points.len() - 1;
                    if segment == last {
                        // Arrival sample at the final route point
                        self.state = SamplerState::Done;
                        let end = self.points[last];
                        return Some(self.emit(end));
                    }

                    let start = self.points[segment];
                    // Non-finite lengths (invalid points) count as a single tick
                    if required_ticks <= 1.0 || !required_ticks.is_finite() {
                        self.state = self.after_segment(segment);
                        return Some(self.emit(start));
                    }

                    let fraction = step as f64 / required_ticks;
                    if fraction >= 1.0 {
                        self.state = self.after_segment(segment);
                        continue;
                    }

                    let position = interpolate(&start, &self.points[segment + 1], fraction);
                    self.state = SamplerState::Sampling {
                        segment,
                        step: step + 1,
                        required_ticks,
                    };
                    return Some(self.emit(position));
                }
                SamplerState::Done => return None,
            }
        }
    }
}
