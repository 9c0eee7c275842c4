//! Error fingerprinting, alert deduplication and severity escalation
//!
//! Every recorded error is grouped by a fingerprint (SHA-256 of
//! `"{error_type}:{message}"`) and counted. Alerting for a fingerprint is
//! gated on two things: at most one alert per cooldown window, and no alert
//! at all until the fingerprint has been seen `escalation_threshold` times.
//! Critical errors bypass both gates.

use crate::correlation::{lookup_correlation_id, AmbientCorrelation, CorrelationIdProvider};
use crate::{ObservabilityError, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use watchtower_core::{ObservabilityConfig, Severity};

/// Default minimum time between two alerts for one fingerprint
pub const DEFAULT_ALERT_COOLDOWN: Duration = Duration::from_secs(60);

/// Default occurrence count at which alerting and escalation start
pub const DEFAULT_ESCALATION_THRESHOLD: u32 = 5;

/// Fingerprint for an `(error_type, message)` pair
pub fn fingerprint(error_type: &str, message: &str) -> String {
    let digest = Sha256::digest(format!("{}:{}", error_type, message).as_bytes());
    hex::encode(digest)
}

/// A single error occurrence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    error_type: String,
    message: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    /// Empty when no correlation id was available
    #[serde(default)]
    pub correlation_id: String,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    #[serde(skip)]
    fingerprint: OnceCell<String>,
}

impl ErrorEvent {
    pub fn new(
        error_type: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            severity,
            timestamp: Utc::now(),
            correlation_id: String::new(),
            context: HashMap::new(),
            fingerprint: OnceCell::new(),
        }
    }

    /// Event describing a Rust error value, typed by `error_type`
    pub fn from_error<E: std::error::Error>(
        error_type: &str,
        error: &E,
        severity: Severity,
    ) -> Self {
        Self::new(error_type, error.to_string(), severity)
    }

    pub fn with_context(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: &str) -> Self {
        self.correlation_id = correlation_id.to_string();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn error_type(&self) -> &str {
        &self.error_type
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Computed on first use, then cached
    pub fn fingerprint(&self) -> &str {
        self.fingerprint
            .get_or_init(|| fingerprint(&self.error_type, &self.message))
    }
}

#[derive(Debug, Clone)]
struct FingerprintState {
    count: u64,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    last_alert: Option<DateTime<Utc>>,
}

impl FingerprintState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            first_seen: now,
            last_seen: now,
            last_alert: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct AlertPolicy {
    cooldown: Duration,
    threshold: u32,
}

/// Aggregate counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorStats {
    pub unique_errors: usize,
    pub total_occurrences: u64,
    pub alerts_sent: u64,
}

/// Per-fingerprint view for introspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintSummary {
    pub fingerprint: String,
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_alert: Option<DateTime<Utc>>,
}

/// Error deduplication and escalation handler
pub struct ErrorHandler {
    states: Mutex<HashMap<String, FingerprintState>>,
    policy: RwLock<AlertPolicy>,
    alerts_sent: AtomicU64,
    correlation: Arc<dyn CorrelationIdProvider>,
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandler")
            .field("policy", &*self.policy.read())
            .field("tracked", &self.states.lock().len())
            .finish_non_exhaustive()
    }
}

impl ErrorHandler {
    /// Handler reading the thread-local correlation context
    pub fn new() -> Self {
        Self::with_provider(Arc::new(AmbientCorrelation))
    }

    pub fn with_provider(correlation: Arc<dyn CorrelationIdProvider>) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            policy: RwLock::new(AlertPolicy {
                cooldown: DEFAULT_ALERT_COOLDOWN,
                threshold: DEFAULT_ESCALATION_THRESHOLD,
            }),
            alerts_sent: AtomicU64::new(0),
            correlation,
        }
    }

    pub fn from_config(
        config: &ObservabilityConfig,
        correlation: Arc<dyn CorrelationIdProvider>,
    ) -> Result<Self> {
        let handler = Self::with_provider(correlation);
        handler.set_alert_cooldown(config.alerting.cooldown_seconds)?;
        handler.set_escalation_threshold(config.alerting.escalation_threshold)?;
        Ok(handler)
    }

    pub fn set_alert_cooldown(&self, seconds: f64) -> Result<()> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(ObservabilityError::InvalidCooldown(seconds));
        }
        let cooldown = Duration::try_from_secs_f64(seconds)
            .map_err(|_| ObservabilityError::InvalidCooldown(seconds))?;

        self.policy.write().cooldown = cooldown;
        debug!(cooldown_secs = seconds, "Alert cooldown set");
        Ok(())
    }

    pub fn set_escalation_threshold(&self, threshold: u32) -> Result<()> {
        if threshold < 1 {
            return Err(ObservabilityError::InvalidThreshold(threshold));
        }
        self.policy.write().threshold = threshold;
        debug!(threshold, "Escalation threshold set");
        Ok(())
    }

    pub fn alert_cooldown(&self) -> Duration {
        self.policy.read().cooldown
    }

    pub fn escalation_threshold(&self) -> u32 {
        self.policy.read().threshold
    }

    /// Count an occurrence, attaching the ambient correlation id when the event has none
    pub fn record_error(&self, mut event: ErrorEvent) -> Result<ErrorEvent> {
        if event.correlation_id.is_empty() {
            event.correlation_id =
                lookup_correlation_id(self.correlation.as_ref()).unwrap_or_default();
        }

        let now = Utc::now();
        let fp = event.fingerprint().to_string();
        let count = {
            let mut states = self.states.lock();
            let state = states
                .entry(fp.clone())
                .or_insert_with(|| FingerprintState::new(now));
            state.count += 1;
            state.last_seen = now;
            state.count
        };

        debug!(
            fingerprint = %fp,
            error_type = %event.error_type,
            severity = %event.severity,
            count,
            correlation_id = %event.correlation_id,
            "Error recorded"
        );

        let threshold = u64::from(self.escalation_threshold());
        if count == threshold || count == threshold * 2 || count == threshold * 3 {
            warn!(
                fingerprint = %fp,
                error_type = %event.error_type,
                count,
                escalated = %escalate(event.severity, count, threshold),
                "Error crossed escalation tier"
            );
        }

        Ok(event)
    }

    /// Whether an alert should be raised for this occurrence
    pub fn should_alert_for_error(&self, event: &ErrorEvent) -> bool {
        if event.severity.is_critical() {
            return true;
        }

        let policy = *self.policy.read();
        let (count, last_alert) = {
            let states = self.states.lock();
            states
                .get(event.fingerprint())
                .map(|s| (s.count, s.last_alert))
                .unwrap_or((0, None))
        };

        if let Some(last) = last_alert {
            let elapsed = (Utc::now() - last).to_std().unwrap_or_default();
            if elapsed < policy.cooldown {
                debug!(
                    fingerprint = %event.fingerprint(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Alert suppressed by cooldown"
                );
                return false;
            }
        }

        let alert = count >= u64::from(policy.threshold);
        if !alert {
            debug!(
                fingerprint = %event.fingerprint(),
                count,
                threshold = policy.threshold,
                "Alert suppressed below threshold"
            );
        }
        alert
    }

    /// Severity raised according to how often the fingerprint has been seen.
    /// Never lower than the event's own severity.
    pub fn get_escalated_severity(&self, event: &ErrorEvent) -> Severity {
        let count = self.error_count(event.fingerprint());
        escalate(event.severity, count, u64::from(self.escalation_threshold()))
    }

    /// Start the cooldown window for the event's fingerprint
    pub fn record_alert_sent(&self, event: &ErrorEvent) {
        let now = Utc::now();
        let fp = event.fingerprint();
        {
            let mut states = self.states.lock();
            let state = states
                .entry(fp.to_string())
                .or_insert_with(|| FingerprintState::new(now));
            state.last_alert = Some(now);
        }
        self.alerts_sent.fetch_add(1, Ordering::Relaxed);

        info!(fingerprint = %fp, severity = %event.severity, "Alert sent");
    }

    /// Forget fingerprints. With `older_than`, only those not seen within
    /// that window are dropped; without it, everything is cleared.
    /// Returns the number of fingerprints removed.
    pub fn clear_error_counts(&self, older_than: Option<Duration>) -> usize {
        let mut states = self.states.lock();
        let before = states.len();

        match older_than {
            None => states.clear(),
            Some(age) => {
                let cutoff = chrono::Duration::from_std(age)
                    .ok()
                    .and_then(|age| Utc::now().checked_sub_signed(age));
                // No representable cutoff means nothing can be that old
                if let Some(cutoff) = cutoff {
                    states.retain(|_, s| s.last_seen > cutoff);
                }
            }
        }

        let removed = before - states.len();
        info!(removed, remaining = states.len(), "Cleared error counts");
        removed
    }

    pub fn error_count(&self, fingerprint: &str) -> u64 {
        self.states
            .lock()
            .get(fingerprint)
            .map(|s| s.count)
            .unwrap_or(0)
    }

    pub fn tracked_fingerprints(&self) -> Vec<String> {
        self.states.lock().keys().cloned().collect()
    }

    pub fn summary(&self, fingerprint: &str) -> Option<FingerprintSummary> {
        self.states
            .lock()
            .get(fingerprint)
            .map(|s| FingerprintSummary {
                fingerprint: fingerprint.to_string(),
                count: s.count,
                first_seen: s.first_seen,
                last_seen: s.last_seen,
                last_alert: s.last_alert,
            })
    }

    pub fn stats(&self) -> ErrorStats {
        let states = self.states.lock();
        ErrorStats {
            unique_errors: states.len(),
            total_occurrences: states.values().map(|s| s.count).sum(),
            alerts_sent: self.alerts_sent.load(Ordering::Relaxed),
        }
    }
}

fn escalate(severity: Severity, count: u64, threshold: u64) -> Severity {
    let tier = if count >= threshold * 3 {
        Severity::Critical
    } else if count >= threshold * 2 {
        Severity::Error
    } else if count >= threshold {
        Severity::Warning
    } else {
        return severity;
    };
    severity.max(tier)
}
