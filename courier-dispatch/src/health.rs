//! Endpoint health probing.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    classify::{ErrorReport, classify},
    endpoint::{Endpoint, EndpointId},
    error::DispatchError,
    pool::EndpointPool,
    transport::{Stage, TransportError},
};

/// Longest time a probe result may be reused.
const MAX_CACHE_TTL_SECS: u64 = 300;

/// Shortest pause between failed probes.
const MIN_RETRY_PAUSE_MS: u64 = 1000;

/// Checks that an endpoint is reachable and accepts its credentials.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// # Errors
    ///
    /// Whatever stopped the endpoint from passing.
    async fn probe(&self, endpoint: &Endpoint) -> Result<(), TransportError>;
}

/// Configuration for health checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Upper bound on a whole probe (seconds)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Pause between failed probes while looking for a healthy endpoint
    /// (milliseconds, at least 1000)
    #[serde(default = "default_retry_pause")]
    pub retry_pause_ms: u64,

    /// How long a probe result is reused (seconds, 0 disables, at most 300)
    #[serde(default)]
    pub cache_ttl_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            retry_pause_ms: default_retry_pause(),
            cache_ttl_secs: 0,
        }
    }
}

const fn default_timeout() -> u64 {
    10
}

const fn default_retry_pause() -> u64 {
    1000
}

impl HealthConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_pause(&self) -> Duration {
        Duration::from_millis(self.retry_pause_ms.max(MIN_RETRY_PAUSE_MS))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs.min(MAX_CACHE_TTL_SECS))
    }
}

/// The outcome of probing one endpoint during pre-flight verification.
#[derive(Debug)]
pub struct Verification {
    pub endpoint: Arc<Endpoint>,
    pub error: Option<TransportError>,
}

impl Verification {
    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// A classified report for a failed verification.
    pub fn report(&self) -> Option<ErrorReport> {
        self.error
            .as_ref()
            .map(|error| classify(&error.reason(), &self.endpoint.sender, &self.endpoint))
    }
}

/// Runs probes and picks healthy endpoints out of a pool
pub struct HealthChecker {
    config: HealthConfig,
    probe: Arc<dyn HealthProbe>,
    cache: DashMap<EndpointId, (Instant, bool)>,
}

impl HealthChecker {
    pub fn new(config: HealthConfig, probe: Arc<dyn HealthProbe>) -> Self {
        Self {
            config,
            probe,
            cache: DashMap::new(),
        }
    }

    pub const fn config(&self) -> &HealthConfig {
        &self.config
    }

    async fn run_probe(&self, endpoint: &Endpoint) -> Result<(), TransportError> {
        let timeout = self.config.timeout();

        tokio::time::timeout(timeout, self.probe.probe(endpoint))
            .await
            .map_err(|_| TransportError::Timeout {
                stage: Stage::Connect,
                timeout,
            })?
    }

    fn cached(&self, id: &EndpointId) -> Option<bool> {
        let ttl = self.config.cache_ttl();
        if ttl.is_zero() {
            return None;
        }

        self.cache
            .get(id)
            .filter(|entry| entry.0.elapsed() < ttl)
            .map(|entry| entry.1)
    }

    /// Probe `endpoint`. Never fails: any error or timeout is logged and
    /// counts as unhealthy.
    pub async fn is_healthy(&self, endpoint: &Endpoint) -> bool {
        let id = endpoint.id();
        if let Some(healthy) = self.cached(&id) {
            debug!(endpoint = %endpoint, healthy, "Using cached health result");
            return healthy;
        }

        let healthy = match self.run_probe(endpoint).await {
            Ok(()) => {
                debug!(endpoint = %endpoint, "Endpoint healthy");
                true
            }
            Err(error) => {
                warn!(endpoint = %endpoint, %error, "Endpoint failed health check");
                false
            }
        };

        if !self.config.cache_ttl().is_zero() {
            self.cache.insert(id, (Instant::now(), healthy));
        }

        healthy
    }

    /// The next healthy endpoint in rotation order.
    ///
    /// Probes at most `pool.len()` candidates, pausing between failed probes
    /// (but not after the last one).
    ///
    /// # Errors
    ///
    /// [`DispatchError::NoEndpointsAvailable`] for an empty pool, and
    /// [`DispatchError::NoHealthyEndpoints`] once a full rotation has failed.
    pub async fn get_healthy_endpoint(
        &self,
        pool: &EndpointPool,
    ) -> Result<Arc<Endpoint>, DispatchError> {
        let attempts = pool.len();
        if attempts == 0 {
            return Err(DispatchError::NoEndpointsAvailable);
        }

        for attempt in 1..=attempts {
            let candidate = pool.next_candidate()?;

            if self.is_healthy(&candidate).await {
                return Ok(candidate);
            }

            if attempt < attempts {
                tokio::time::sleep(self.config.retry_pause()).await;
            }
        }

        warn!(probed = attempts, "No healthy endpoints in pool");
        Err(DispatchError::NoHealthyEndpoints { probed: attempts })
    }

    /// Probe every endpoint once, in pool order.
    pub async fn verify_all(&self, pool: &EndpointPool) -> Vec<Verification> {
        let mut verifications = Vec::with_capacity(pool.len());

        for endpoint in pool.endpoints() {
            let error = self.run_probe(endpoint).await.err();

            match &error {
                None => debug!(endpoint = %endpoint, "Endpoint verified"),
                Some(error) => warn!(endpoint = %endpoint, %error, "Endpoint failed verification"),
            }

            verifications.push(Verification {
                endpoint: Arc::clone(endpoint),
                error,
            });
        }

        verifications
    }
}
