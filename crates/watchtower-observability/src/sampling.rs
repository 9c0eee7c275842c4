//! Head-based sampling
//!
//! A sampling decision is made once per logical request and reused by every
//! observability call made on its behalf. The effective rate is resolved with
//! precedence operation > service > default, and the decision itself is keyed
//! on the ambient correlation id so that all calls within one request agree.
//!
//! # Bucketing
//!
//! A correlation id is mapped to a bucket in `[0, 1)` by taking the first eight
//! bytes of its SHA-256 digest as a big-endian `u64`, keeping the top 53 bits
//! and dividing by 2^53. The request is sampled when `bucket < rate`. The
//! mapping is stable across processes and platforms. Without a correlation id
//! the bucket is drawn from the operating system's CSPRNG instead.

use crate::correlation::{lookup_correlation_id, AmbientCorrelation, CorrelationIdProvider};
use crate::{ObservabilityError, Result};
use parking_lot::RwLock;
use rand::{rngs::OsRng, Rng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace};
use watchtower_core::{is_valid_rate, DeploymentEnvironment, ObservabilityConfig};

/// Rate table consulted on every sampling decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfiguration {
    pub environment: DeploymentEnvironment,
    pub default_rate: f64,
    pub service_rates: HashMap<String, f64>,
    pub operation_rates: HashMap<String, f64>,
}

impl SamplingConfiguration {
    pub fn for_environment(environment: DeploymentEnvironment) -> Self {
        Self {
            environment,
            default_rate: environment.default_sample_rate(),
            service_rates: HashMap::new(),
            operation_rates: HashMap::new(),
        }
    }

    /// Effective rate and where it came from
    pub fn resolve(&self, operation: Option<&str>, service: Option<&str>) -> (f64, RateSource) {
        if let Some(rate) = operation.and_then(|op| self.operation_rates.get(op)) {
            return (*rate, RateSource::Operation);
        }
        if let Some(rate) = service.and_then(|svc| self.service_rates.get(svc)) {
            return (*rate, RateSource::Service);
        }
        (self.default_rate, RateSource::Default)
    }
}

impl Default for SamplingConfiguration {
    fn default() -> Self {
        Self::for_environment(DeploymentEnvironment::default())
    }
}

/// Which override produced the effective rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    Operation,
    Service,
    Default,
}

/// Outcome of a sampling decision
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingDecision {
    pub sampled: bool,
    pub rate: f64,
    pub source: RateSource,
    /// False only when the decision needed a random draw
    pub deterministic: bool,
}

/// Stable bucket in `[0, 1)` for a correlation id
pub fn bucket_for(correlation_id: &str) -> f64 {
    let digest = Sha256::digest(correlation_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let value = u64::from_be_bytes(prefix) >> 11;
    value as f64 / (1u64 << 53) as f64
}

/// Head-based sampler
pub struct Sampler {
    config: RwLock<SamplingConfiguration>,
    correlation: Arc<dyn CorrelationIdProvider>,
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new(DeploymentEnvironment::default())
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("config", &*self.config.read())
            .finish_non_exhaustive()
    }
}

impl Sampler {
    /// Sampler reading the thread-local correlation context
    pub fn new(environment: DeploymentEnvironment) -> Self {
        Self::with_provider(environment, Arc::new(AmbientCorrelation))
    }

    pub fn with_provider(
        environment: DeploymentEnvironment,
        correlation: Arc<dyn CorrelationIdProvider>,
    ) -> Self {
        Self {
            config: RwLock::new(SamplingConfiguration::for_environment(environment)),
            correlation,
        }
    }

    /// Build from configuration, applying every rate override
    pub fn from_config(
        config: &ObservabilityConfig,
        correlation: Arc<dyn CorrelationIdProvider>,
    ) -> Result<Self> {
        let environment = parse_environment(&config.environment)?;
        let sampler = Self::with_provider(environment, correlation);

        if let Some(rate) = config.sampling.default_rate {
            sampler.set_default_rate(rate)?;
        }
        for (service, rate) in &config.sampling.service_rates {
            sampler.set_service_rate(service, *rate)?;
        }
        for (operation, rate) in &config.sampling.operation_rates {
            sampler.set_operation_rate(operation, *rate)?;
        }

        Ok(sampler)
    }

    /// Switch environment and reset the default rate to the environment's rate.
    /// Service and operation overrides are kept.
    pub fn set_environment(&self, name: &str) -> Result<()> {
        let environment = parse_environment(name)?;
        let mut config = self.config.write();
        config.environment = environment;
        config.default_rate = environment.default_sample_rate();

        info!(
            environment = %environment,
            default_rate = config.default_rate,
            "Sampling environment set"
        );
        Ok(())
    }

    pub fn environment(&self) -> DeploymentEnvironment {
        self.config.read().environment
    }

    pub fn set_default_rate(&self, rate: f64) -> Result<()> {
        check_rate(rate)?;
        self.config.write().default_rate = rate;
        debug!(rate, "Default sampling rate set");
        Ok(())
    }

    pub fn set_service_rate(&self, service: &str, rate: f64) -> Result<()> {
        check_rate(rate)?;
        self.config
            .write()
            .service_rates
            .insert(service.to_string(), rate);
        debug!(service, rate, "Service sampling rate set");
        Ok(())
    }

    pub fn set_operation_rate(&self, operation: &str, rate: f64) -> Result<()> {
        check_rate(rate)?;
        self.config
            .write()
            .operation_rates
            .insert(operation.to_string(), rate);
        debug!(operation, rate, "Operation sampling rate set");
        Ok(())
    }

    pub fn remove_service_rate(&self, service: &str) -> Option<f64> {
        self.config.write().service_rates.remove(service)
    }

    pub fn remove_operation_rate(&self, operation: &str) -> Option<f64> {
        self.config.write().operation_rates.remove(operation)
    }

    /// Snapshot of the current rate table
    pub fn configuration(&self) -> SamplingConfiguration {
        self.config.read().clone()
    }

    /// Effective rate without making a decision
    pub fn get_current_rate(&self, operation: Option<&str>, service: Option<&str>) -> f64 {
        self.config.read().resolve(operation, service).0
    }

    pub fn should_sample(&self, operation: Option<&str>, service: Option<&str>) -> bool {
        self.decide(operation, service).sampled
    }

    /// Full sampling decision. Never fails: a failed correlation lookup falls
    /// back to a random draw.
    pub fn decide(&self, operation: Option<&str>, service: Option<&str>) -> SamplingDecision {
        let (rate, source) = self.config.read().resolve(operation, service);

        if rate >= 1.0 || rate <= 0.0 {
            return SamplingDecision {
                sampled: rate >= 1.0,
                rate,
                source,
                deterministic: true,
            };
        }

        let (bucket, deterministic) = match lookup_correlation_id(self.correlation.as_ref()) {
            Some(id) => (bucket_for(&id), true),
            None => (OsRng.gen::<f64>(), false),
        };

        let sampled = bucket < rate;
        trace!(
            operation = ?operation,
            service = ?service,
            rate,
            source = ?source,
            deterministic,
            sampled,
            "Sampling decision"
        );

        SamplingDecision {
            sampled,
            rate,
            source,
            deterministic,
        }
    }
}

fn parse_environment(name: &str) -> Result<DeploymentEnvironment> {
    name.parse()
        .map_err(|_| ObservabilityError::InvalidEnvironment(name.to_string()))
}

fn check_rate(rate: f64) -> Result<()> {
    if is_valid_rate(rate) {
        Ok(())
    } else {
        Err(ObservabilityError::InvalidRate(rate))
    }
}
