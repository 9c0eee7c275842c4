//! Observability monitor
//!
//! Single entry point combining the sampler, the error handler and the
//! in-memory stores for metrics, traces, alerts, health checks and logs.

use crate::correlation::{get_current_context, AmbientCorrelation, CorrelationIdProvider};
use crate::error_handling::{ErrorEvent, ErrorHandler};
use crate::sampling::Sampler;
use crate::{ObservabilityError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use watchtower_core::{
    Alert, AlertStatus, CoreError, HealthCheck, HealthStatus, InMemoryRepository, LogEntry,
    Metric, ObservabilityConfig, Repository, Severity, Trace, TraceStatus,
};

const MAX_TITLE_LEN: usize = 255;

/// Health of every known component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSummary {
    /// Worst status across components; healthy when nothing has reported
    pub overall_status: HealthStatus,
    /// Latest check per component
    pub components: Vec<HealthCheck>,
    pub timestamp: DateTime<Utc>,
}

pub struct ObservabilityMonitor {
    service_name: String,
    sampler: Arc<Sampler>,
    errors: Arc<ErrorHandler>,
    metrics: InMemoryRepository<Metric>,
    traces: InMemoryRepository<Trace>,
    alerts: InMemoryRepository<Alert>,
    /// Held from the alert decision until the alert is stored
    alert_gate: Mutex<()>,
    health_checks: InMemoryRepository<HealthCheck>,
    logs: InMemoryRepository<LogEntry>,
}

impl std::fmt::Debug for ObservabilityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservabilityMonitor")
            .field("service_name", &self.service_name)
            .field("sampler", &self.sampler)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

impl ObservabilityMonitor {
    pub fn new(service_name: &str, sampler: Arc<Sampler>, errors: Arc<ErrorHandler>) -> Self {
        Self {
            service_name: service_name.to_string(),
            sampler,
            errors,
            metrics: InMemoryRepository::new("metric"),
            traces: InMemoryRepository::new("trace"),
            alerts: InMemoryRepository::new("alert"),
            alert_gate: Mutex::new(()),
            health_checks: InMemoryRepository::new("health check"),
            logs: InMemoryRepository::new("log entry"),
        }
    }

    /// Monitor reading correlation ids from the thread-local context
    pub fn from_config(config: &ObservabilityConfig) -> Result<Self> {
        Self::from_config_with_provider(config, Arc::new(AmbientCorrelation))
    }

    pub fn from_config_with_provider(
        config: &ObservabilityConfig,
        correlation: Arc<dyn CorrelationIdProvider>,
    ) -> Result<Self> {
        config.validate().map_err(|e| match e {
            CoreError::Validation(msg) => ObservabilityError::Configuration(msg),
            other => other.into(),
        })?;
        let sampler = Sampler::from_config(config, Arc::clone(&correlation))?;
        let errors = ErrorHandler::from_config(config, correlation)?;

        info!(
            service = %config.service_name,
            environment = %config.environment,
            "Observability monitor created"
        );

        Ok(Self::new(
            &config.service_name,
            Arc::new(sampler),
            Arc::new(errors),
        ))
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    pub fn error_handler(&self) -> &ErrorHandler {
        &self.errors
    }

    // Metrics

    pub fn record_metric(&self, metric: Metric) -> Result<Metric> {
        metric.check()?;
        debug!(
            name = %metric.name,
            value = metric.value,
            kind = metric.metric_type.as_str(),
            "Metric recorded"
        );
        Ok(self.metrics.save(metric)?)
    }

    pub fn metrics_named(&self, name: &str) -> Vec<Metric> {
        self.metrics.find(&|m: &Metric| m.name == name)
    }

    // Traces

    /// Open a span if the operation is sampled. The span joins the ambient
    /// correlation context's trace when one is entered.
    pub fn start_trace(&self, operation: &str, service: Option<&str>) -> Option<Trace> {
        let service = service.unwrap_or(&self.service_name);
        let decision = self.sampler.decide(Some(operation), Some(service));
        if !decision.sampled {
            debug!(operation, service, rate = decision.rate, "Trace not sampled");
            return None;
        }

        let trace = Trace::start(operation, service);
        Some(match get_current_context() {
            Some(ctx) => trace.with_parent(&ctx.trace_id, Some(&ctx.span_id)),
            None => trace,
        })
    }

    pub fn finish_trace(&self, mut trace: Trace, status: TraceStatus) -> Result<Trace> {
        trace.finish(status);
        trace.check()?;
        debug!(
            operation = %trace.operation,
            trace_id = %trace.trace_id,
            duration_ms = trace.duration_ms.unwrap_or_default(),
            status = ?status,
            "Trace finished"
        );
        Ok(self.traces.save(trace)?)
    }

    pub fn traces_for(&self, trace_id: &str) -> Vec<Trace> {
        self.traces.find(&|t: &Trace| t.trace_id == trace_id)
    }

    // Errors and alerts

    /// Record an error and raise or refresh an alert when the error handler allows it.
    ///
    /// An unresolved alert with the same fingerprint is updated in place rather
    /// than duplicated.
    pub fn capture_error(&self, event: ErrorEvent) -> Result<Option<Alert>> {
        let event = self.errors.record_error(event)?;
        let _gate = self.alert_gate.lock();

        if !self.errors.should_alert_for_error(&event) {
            return Ok(None);
        }

        let severity = self.errors.get_escalated_severity(&event);
        let occurrences = self.errors.error_count(event.fingerprint()).max(1);
        let fingerprint = event.fingerprint().to_string();

        let open = self.alerts.find(&|a: &Alert| {
            a.status != AlertStatus::Resolved
                && a.fingerprint.as_deref() == Some(fingerprint.as_str())
        });

        let alert = match open.into_iter().next() {
            Some(existing) => {
                let (updated, _) = self.alerts.update(existing.id, |a| {
                    a.occurrences = occurrences;
                    a.severity = a.severity.max(severity);
                    a.message = event.message().to_string();
                    Ok(())
                })?;
                updated
            }
            None => {
                let alert = Alert::new(alert_title(&event), event.message(), severity)
                    .with_fingerprint(&fingerprint)
                    .with_source(&self.service_name)
                    .with_occurrences(occurrences);
                alert.check()?;
                self.alerts.save(alert)?
            }
        };

        self.errors.record_alert_sent(&event);
        warn!(
            alert_id = %alert.id,
            fingerprint = %fingerprint,
            severity = %alert.severity,
            occurrences,
            "Alert raised: {}",
            alert.title
        );

        Ok(Some(alert))
    }

    pub fn acknowledge_alert(&self, id: Uuid) -> Result<Alert> {
        let (alert, _) = self.alerts.update(id, |a| a.acknowledge())?;
        info!(alert_id = %id, "Alert acknowledged");
        Ok(alert)
    }

    pub fn resolve_alert(&self, id: Uuid) -> Result<Alert> {
        let (alert, _) = self.alerts.update(id, |a| {
            a.resolve();
            Ok(())
        })?;
        info!(alert_id = %id, "Alert resolved");
        Ok(alert)
    }

    pub fn get_alert(&self, id: Uuid) -> Result<Alert> {
        Ok(self.alerts.get(id)?)
    }

    pub fn active_alerts(&self) -> Vec<Alert> {
        let mut alerts = self.alerts.find(&|a: &Alert| a.is_active());
        alerts.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then(a.created_at.cmp(&b.created_at))
        });
        alerts
    }

    // Health

    pub fn record_health_check(&self, check: HealthCheck) -> Result<HealthCheck> {
        check.check()?;
        if !check.status.is_healthy() {
            warn!(
                component = %check.component,
                status = check.status.as_str(),
                message = ?check.message,
                "Component not healthy"
            );
        }
        Ok(self.health_checks.save(check)?)
    }

    pub fn health_summary(&self) -> HealthSummary {
        let mut latest: HashMap<String, HealthCheck> = HashMap::new();
        for check in self.health_checks.list() {
            let newer = latest
                .get(&check.component)
                .map_or(true, |seen| check.checked_at > seen.checked_at);
            if newer {
                latest.insert(check.component.clone(), check);
            }
        }

        let mut components: Vec<HealthCheck> = latest.into_values().collect();
        components.sort_by(|a, b| a.component.cmp(&b.component));

        let overall_status = components
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);

        HealthSummary {
            overall_status,
            components,
            timestamp: Utc::now(),
        }
    }

    // Logs

    /// Store and emit a log entry. Error and critical entries are always kept;
    /// others are kept when the sampler samples the entry's logger.
    /// Returns whether the entry was kept.
    pub fn log(&self, mut entry: LogEntry) -> Result<bool> {
        entry.check()?;

        let keep = entry.level >= Severity::Error
            || self
                .sampler
                .should_sample(Some(&entry.logger), Some(&self.service_name));
        if !keep {
            return Ok(false);
        }

        if entry.correlation_id.is_none() {
            entry.correlation_id = get_current_context().map(|ctx| ctx.request_id);
        }

        let correlation_id = entry.correlation_id.as_deref().unwrap_or("");
        match entry.level {
            Severity::Info => info!(logger = %entry.logger, correlation_id, "{}", entry.message),
            Severity::Warning => warn!(logger = %entry.logger, correlation_id, "{}", entry.message),
            Severity::Error | Severity::Critical => {
                error!(
                    logger = %entry.logger,
                    correlation_id,
                    level = %entry.level,
                    "{}",
                    entry.message
                )
            }
        }

        self.logs.save(entry)?;
        Ok(true)
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        let mut logs = self.logs.list();
        logs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        logs
    }
}

fn alert_title(event: &ErrorEvent) -> String {
    let title = if event.error_type().trim().is_empty() {
        "UnknownError"
    } else {
        event.error_type()
    };
    title.chars().take(MAX_TITLE_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::{ContextGuard, CorrelationContext};
    use watchtower_core::{DeploymentEnvironment, MetricType};

    fn monitor() -> ObservabilityMonitor {
        let provider: Arc<dyn CorrelationIdProvider> =
            Arc::new(|| -> Result<Option<String>> { Ok(None) });
        ObservabilityMonitor::new(
            "checkout",
            Arc::new(Sampler::with_provider(
                DeploymentEnvironment::Development,
                Arc::clone(&provider),
            )),
            Arc::new(ErrorHandler::with_provider(provider)),
        )
    }

    #[test]
    fn test_record_metric() {
        let monitor = monitor();
        monitor
            .record_metric(Metric::counter("orders_total", 1.0).with_label("region", "eu"))
            .unwrap();

        let metrics = monitor.metrics_named("orders_total");
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].metric_type, MetricType::Counter);
        assert!(monitor.record_metric(Metric::counter("orders_total", -1.0)).is_err());
    }

    #[test]
    fn test_trace_sampled_and_stored() {
        let monitor = monitor();
        let trace = monitor.start_trace("POST /orders", None).unwrap();
        assert_eq!(trace.service, "checkout");

        let finished = monitor.finish_trace(trace, TraceStatus::Ok).unwrap();
        assert_eq!(monitor.traces_for(&finished.trace_id).len(), 1);
    }

    #[test]
    fn test_trace_not_sampled() {
        let monitor = monitor();
        monitor.sampler().set_operation_rate("GET /health", 0.0).unwrap();

        assert!(monitor.start_trace("GET /health", None).is_none());
    }

    #[test]
    fn test_trace_joins_ambient_context() {
        let monitor = monitor();
        let ctx = CorrelationContext::with_request_id("req-1");
        let expected_trace = ctx.trace_id.clone();
        let expected_parent = ctx.span_id.clone();
        let _guard = ContextGuard::enter(ctx);

        let trace = monitor.start_trace("GET /cart", Some("cart")).unwrap();
        assert_eq!(trace.trace_id, expected_trace);
        assert_eq!(trace.parent_span_id, Some(expected_parent));
        assert_eq!(trace.service, "cart");
    }

    #[test]
    fn test_capture_error_deduplicates_alerts() {
        let monitor = monitor();
        monitor.error_handler().set_escalation_threshold(2).unwrap();
        monitor.error_handler().set_alert_cooldown(0.0).unwrap();
        let event = ErrorEvent::new("PaymentError", "card declined", Severity::Warning);

        assert!(monitor.capture_error(event.clone()).unwrap().is_none());

        let first = monitor.capture_error(event.clone()).unwrap().unwrap();
        assert_eq!(first.occurrences, 2);
        assert_eq!(first.severity, Severity::Warning);

        let second = monitor.capture_error(event.clone()).unwrap().unwrap();
        let third = monitor.capture_error(event).unwrap().unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(third.occurrences, 4);
        assert_eq!(third.severity, Severity::Error);
        assert_eq!(monitor.active_alerts().len(), 1);
    }

    #[test]
    fn test_critical_error_alerts_immediately() {
        let monitor = monitor();
        let alert = monitor
            .capture_error(ErrorEvent::new("OutOfMemory", "heap exhausted", Severity::Critical))
            .unwrap()
            .unwrap();

        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.source, "checkout");
        assert!(alert.fingerprint.is_some());
        assert_eq!(monitor.error_handler().stats().alerts_sent, 1);
    }

    #[test]
    fn test_alert_lifecycle_through_monitor() {
        let monitor = monitor();
        let alert = monitor
            .capture_error(ErrorEvent::new("OutOfMemory", "heap exhausted", Severity::Critical))
            .unwrap()
            .unwrap();

        let acked = monitor.acknowledge_alert(alert.id).unwrap();
        assert_eq!(acked.status, AlertStatus::Acknowledged);
        assert!(monitor.active_alerts().is_empty());

        let resolved = monitor.resolve_alert(alert.id).unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert!(monitor.acknowledge_alert(alert.id).is_err());
        assert!(monitor.resolve_alert(Uuid::new_v4()).is_err());

        // A resolved alert is not reused
        let next = monitor
            .capture_error(ErrorEvent::new("OutOfMemory", "heap exhausted", Severity::Critical))
            .unwrap()
            .unwrap();
        assert_ne!(next.id, alert.id);
    }

    #[test]
    fn test_get_alert() {
        let monitor = monitor();
        let alert = monitor
            .capture_error(ErrorEvent::new("OutOfMemory", "heap exhausted", Severity::Critical))
            .unwrap()
            .unwrap();

        let stored = monitor.get_alert(alert.id).unwrap();
        assert_eq!(stored.id, alert.id);
        assert_eq!(stored.title, "OutOfMemory");
        assert!(monitor.get_alert(Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_health_summary() {
        let monitor = monitor();
        assert_eq!(monitor.health_summary().overall_status, HealthStatus::Healthy);

        monitor.record_health_check(HealthCheck::unhealthy("redis", "timeout")).unwrap();
        monitor.record_health_check(HealthCheck::healthy("postgres")).unwrap();
        let mut recovered = HealthCheck::healthy("redis");
        recovered.checked_at = Utc::now() + chrono::Duration::seconds(1);
        monitor.record_health_check(recovered).unwrap();

        let summary = monitor.health_summary();
        assert_eq!(summary.components.len(), 2);
        assert_eq!(summary.overall_status, HealthStatus::Healthy);

        monitor
            .record_health_check(HealthCheck::new("queue", HealthStatus::Degraded))
            .unwrap();
        assert_eq!(monitor.health_summary().overall_status, HealthStatus::Degraded);
    }

    #[test]
    fn test_log_sampling() {
        let monitor = monitor();
        monitor.sampler().set_operation_rate("noisy", 0.0).unwrap();

        assert!(!monitor.log(LogEntry::info("noisy", "cache hit")).unwrap());
        assert!(monitor.log(LogEntry::error("noisy", "cache down")).unwrap());
        assert!(monitor.log(LogEntry::info("orders", "order placed")).unwrap());
        assert_eq!(monitor.logs().len(), 2);
        assert!(monitor.log(LogEntry::info("orders", "")).is_err());
    }

    #[test]
    fn test_log_attaches_correlation_id() {
        let monitor = monitor();
        let _guard = ContextGuard::enter(CorrelationContext::with_request_id("req-5"));

        monitor.log(LogEntry::info("orders", "order placed")).unwrap();
        assert_eq!(monitor.logs()[0].correlation_id.as_deref(), Some("req-5"));
    }

    #[test]
    fn test_alert_title() {
        let unnamed = ErrorEvent::new("", "boom", Severity::Error);
        assert_eq!(alert_title(&unnamed), "UnknownError");

        let long = ErrorEvent::new("E".repeat(300), "boom", Severity::Error);
        assert_eq!(alert_title(&long).len(), MAX_TITLE_LEN);
    }

    #[test]
    fn test_from_config() {
        let mut config = ObservabilityConfig::default();
        config.service_name = "inventory".to_string();
        config.environment = "production".to_string();

        let monitor = ObservabilityMonitor::from_config(&config).unwrap();
        assert_eq!(monitor.service_name(), "inventory");
        assert_eq!(monitor.sampler().get_current_rate(None, None), 0.1);

        config.environment = "qa".to_string();
        assert!(ObservabilityMonitor::from_config(&config).is_err());
    }
}
