//! Adaptive per-endpoint pacing
//!
//! Each endpoint carries a delay that drifts with how it behaves:
//!
//! ```text
//! success, response < fast threshold  -> max(floor, delay * fast_factor)
//! failure                             -> min(ceiling, delay * failure_factor)
//! success, response > slow threshold  -> min(slow_ceiling, delay * slow_factor)
//! otherwise                           -> unchanged
//! ```
//!
//! The suggested pause before the next message is
//! `delay * (1 + failure_weight * recent_failures) * U[jitter_min, jitter_max]`.

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::endpoint::EndpointId;

/// Configuration for adaptive throttling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Delay a newly seen endpoint starts with (seconds)
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: f64,

    /// Fast responses never take the delay below this
    #[serde(default = "default_floor")]
    pub floor_secs: f64,

    /// Failures never take the delay above this; also caps every pause
    #[serde(default = "default_ceiling")]
    pub ceiling_secs: f64,

    /// Slow responses never take the delay above this
    #[serde(default = "default_slow_ceiling")]
    pub slow_ceiling_secs: f64,

    /// A success quicker than this speeds the endpoint up
    #[serde(default = "default_fast_response")]
    pub fast_response_secs: f64,

    /// A success slower than this backs the endpoint off
    #[serde(default = "default_slow_response")]
    pub slow_response_secs: f64,

    #[serde(default = "default_fast_factor")]
    pub fast_factor: f64,

    #[serde(default = "default_failure_factor")]
    pub failure_factor: f64,

    #[serde(default = "default_slow_factor")]
    pub slow_factor: f64,

    /// Extra pause per recent failure, as a fraction of the delay
    #[serde(default = "default_failure_weight")]
    pub failure_weight: f64,

    #[serde(default = "default_jitter_min")]
    pub jitter_min: f64,

    #[serde(default = "default_jitter_max")]
    pub jitter_max: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_initial_delay(),
            floor_secs: default_floor(),
            ceiling_secs: default_ceiling(),
            slow_ceiling_secs: default_slow_ceiling(),
            fast_response_secs: default_fast_response(),
            slow_response_secs: default_slow_response(),
            fast_factor: default_fast_factor(),
            failure_factor: default_failure_factor(),
            slow_factor: default_slow_factor(),
            failure_weight: default_failure_weight(),
            jitter_min: default_jitter_min(),
            jitter_max: default_jitter_max(),
        }
    }
}

const fn default_initial_delay() -> f64 {
    30.0
}

const fn default_floor() -> f64 {
    15.0
}

const fn default_ceiling() -> f64 {
    300.0 // 5 minutes
}

const fn default_slow_ceiling() -> f64 {
    120.0
}

const fn default_fast_response() -> f64 {
    5.0
}

const fn default_slow_response() -> f64 {
    10.0
}

const fn default_fast_factor() -> f64 {
    0.95
}

const fn default_failure_factor() -> f64 {
    1.5
}

const fn default_slow_factor() -> f64 {
    1.1
}

const fn default_failure_weight() -> f64 {
    0.5
}

const fn default_jitter_min() -> f64 {
    0.7
}

const fn default_jitter_max() -> f64 {
    1.3
}

/// Pacing state for a single endpoint
#[derive(Debug)]
struct ThrottleState {
    delay_secs: f64,
    recent_failures: u32,
}

impl ThrottleState {
    const fn new(initial_delay_secs: f64) -> Self {
        Self {
            delay_secs: initial_delay_secs,
            recent_failures: 0,
        }
    }

    fn record(&mut self, config: &ThrottleConfig, success: bool, response_time: Duration) {
        let response_secs = response_time.as_secs_f64();

        if success {
            self.recent_failures = 0;

            if response_secs < config.fast_response_secs {
                self.delay_secs = (self.delay_secs * config.fast_factor).max(config.floor_secs);
            } else if response_secs > config.slow_response_secs {
                self.delay_secs =
                    (self.delay_secs * config.slow_factor).min(config.slow_ceiling_secs);
            }
        } else {
            self.recent_failures = self.recent_failures.saturating_add(1);
            self.delay_secs = (self.delay_secs * config.failure_factor).min(config.ceiling_secs);
        }
    }
}

/// Per-endpoint adaptive throttle
#[derive(Debug, Default)]
pub struct Throttle {
    config: ThrottleConfig,
    states: DashMap<EndpointId, Arc<parking_lot::Mutex<ThrottleState>>>,
}

impl Throttle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            states: DashMap::new(),
        }
    }

    pub const fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    fn get_state(&self, endpoint: &EndpointId) -> Arc<parking_lot::Mutex<ThrottleState>> {
        self.states
            .entry(endpoint.clone())
            .or_insert_with(|| {
                Arc::new(parking_lot::Mutex::new(ThrottleState::new(
                    self.config.initial_delay_secs,
                )))
            })
            .clone()
    }

    /// The pause to take before the next message on `endpoint`.
    ///
    /// This is a suggestion: it may exceed the ceiling when failures pile up,
    /// so callers clamp it with [`Self::clamp`] before sleeping.
    pub fn get_delay(&self, endpoint: &EndpointId, recent_failures: u32) -> Duration {
        let base = self.get_state(endpoint).lock().delay_secs;
        let jitter = if self.config.jitter_max > self.config.jitter_min {
            rand::rng().random_range(self.config.jitter_min..=self.config.jitter_max)
        } else {
            self.config.jitter_min
        };

        let secs = base
            * self
                .config
                .failure_weight
                .mul_add(f64::from(recent_failures), 1.0)
            * jitter;

        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    /// Caps a pause at the configured ceiling.
    pub fn clamp(&self, delay: Duration) -> Duration {
        delay.min(Duration::from_secs_f64(self.config.ceiling_secs.max(0.0)))
    }

    /// Adjust `endpoint`'s delay after an attempt.
    pub fn update(&self, endpoint: &EndpointId, success: bool, response_time: Duration) {
        let state = self.get_state(endpoint);
        let mut state = state.lock();
        let before = state.delay_secs;

        state.record(&self.config, success, response_time);

        debug!(
            endpoint = %endpoint,
            success,
            response_ms = response_time.as_millis(),
            delay_before = before,
            delay_after = state.delay_secs,
            recent_failures = state.recent_failures,
            "Throttle updated"
        );
    }

    /// Current delay for `endpoint`, if it has been seen.
    pub fn delay_secs(&self, endpoint: &EndpointId) -> Option<f64> {
        self.states
            .get(endpoint)
            .map(|state| state.lock().delay_secs)
    }

    /// Consecutive failures since the last success; 0 for unseen endpoints.
    pub fn recent_failures(&self, endpoint: &EndpointId) -> u32 {
        self.states
            .get(endpoint)
            .map_or(0, |state| state.lock().recent_failures)
    }

    pub fn contains(&self, endpoint: &EndpointId) -> bool {
        self.states.contains_key(endpoint)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// A snapshot of every endpoint's state, ordered by endpoint.
    pub fn stats(&self) -> Vec<ThrottleStats> {
        let mut stats: Vec<ThrottleStats> = self
            .states
            .iter()
            .map(|entry| {
                let state = entry.value().lock();
                ThrottleStats {
                    endpoint: entry.key().clone(),
                    delay_secs: state.delay_secs,
                    recent_failures: state.recent_failures,
                }
            })
            .collect();
        stats.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        stats
    }
}

/// Statistics for an endpoint's throttle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThrottleStats {
    pub endpoint: EndpointId,
    pub delay_secs: f64,
    pub recent_failures: u32,
}
