//! Request correlation and context propagation
//!
//! The ambient correlation id is what keeps head-based sampling consistent:
//! every sampling decision made while a context is entered hashes the same id.

use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use uuid::Uuid;

/// Correlation context for a logical request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationContext {
    /// Correlation id shared by everything the request touches
    pub request_id: String,
    /// Trace ID (32 hex chars)
    pub trace_id: String,
    /// Current span ID (16 hex chars)
    pub span_id: String,
    pub parent_span_id: Option<String>,
    /// Service that created the context
    pub service: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Baggage items (propagated context)
    pub baggage: HashMap<String, String>,
}

impl Default for CorrelationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            trace_id: Uuid::new_v4().simple().to_string(),
            span_id: Self::generate_span_id(),
            parent_span_id: None,
            service: None,
            timestamp: Utc::now(),
            baggage: HashMap::new(),
        }
    }

    /// Context with a caller-supplied correlation id
    pub fn with_request_id(request_id: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            ..Self::new()
        }
    }

    /// Create from incoming headers
    pub fn from_headers(headers: &[(String, String)]) -> Self {
        let mut ctx = Self::new();

        for (key, value) in headers {
            match key.to_lowercase().as_str() {
                "x-request-id" | "x-correlation-id" => ctx.request_id = value.clone(),
                "traceparent" => {
                    // version-trace_id-parent_id-flags
                    let parts: Vec<&str> = value.split('-').collect();
                    if parts.len() >= 4 {
                        ctx.trace_id = parts[1].to_string();
                        ctx.parent_span_id = Some(parts[2].to_string());
                    }
                }
                "x-service-name" => ctx.service = Some(value.clone()),
                key if key.starts_with("baggage-") => {
                    let baggage_key = key.trim_start_matches("baggage-");
                    ctx.baggage.insert(baggage_key.to_string(), value.clone());
                }
                _ => {}
            }
        }

        ctx
    }

    fn generate_span_id() -> String {
        format!("{:016x}", rand::random::<u64>())
    }

    /// Create a child context for a nested span
    pub fn child(&self) -> Self {
        Self {
            request_id: self.request_id.clone(),
            trace_id: self.trace_id.clone(),
            span_id: Self::generate_span_id(),
            parent_span_id: Some(self.span_id.clone()),
            service: self.service.clone(),
            timestamp: Utc::now(),
            baggage: self.baggage.clone(),
        }
    }

    pub fn with_service(mut self, service: &str) -> Self {
        self.service = Some(service.to_string());
        self
    }

    pub fn with_baggage(mut self, key: &str, value: &str) -> Self {
        self.baggage.insert(key.to_string(), value.to_string());
        self
    }

    /// Get headers for propagation
    pub fn to_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("X-Request-ID".to_string(), self.request_id.clone()),
            ("traceparent".to_string(), self.traceparent()),
        ];

        if let Some(ref service) = self.service {
            headers.push(("X-Service-Name".to_string(), service.clone()));
        }

        for (key, value) in &self.baggage {
            headers.push((format!("baggage-{}", key), value.clone()));
        }

        headers
    }

    /// W3C traceparent header value
    pub fn traceparent(&self) -> String {
        format!("00-{}-{}-01", self.trace_id, self.span_id)
    }
}

thread_local! {
    static CURRENT_CONTEXT: RefCell<Option<CorrelationContext>> = const { RefCell::new(None) };
}

/// Set current context for the thread
pub fn set_current_context(ctx: CorrelationContext) {
    CURRENT_CONTEXT.with(|c| {
        *c.borrow_mut() = Some(ctx);
    });
}

/// Get current context from thread
pub fn get_current_context() -> Option<CorrelationContext> {
    CURRENT_CONTEXT.with(|c| c.borrow().clone())
}

/// Clear current context
pub fn clear_current_context() {
    CURRENT_CONTEXT.with(|c| {
        *c.borrow_mut() = None;
    });
}

/// Correlation id of the current thread's context, if any
pub fn current_correlation_id() -> Option<String> {
    CURRENT_CONTEXT.with(|c| c.borrow().as_ref().map(|ctx| ctx.request_id.clone()))
}

/// Context guard that restores previous context on drop
pub struct ContextGuard {
    previous: Option<CorrelationContext>,
}

impl ContextGuard {
    /// Enter a new context
    pub fn enter(ctx: CorrelationContext) -> Self {
        let previous = get_current_context();
        set_current_context(ctx);
        Self { previous }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(ctx) = self.previous.take() {
            set_current_context(ctx);
        } else {
            clear_current_context();
        }
    }
}

/// Source of the ambient correlation id.
///
/// Lookups may fail; callers treat a failure the same as "no id".
pub trait CorrelationIdProvider: Send + Sync {
    fn correlation_id(&self) -> Result<Option<String>>;
}

/// Reads the correlation id from the thread-local [`CorrelationContext`]
#[derive(Debug, Clone, Copy, Default)]
pub struct AmbientCorrelation;

impl CorrelationIdProvider for AmbientCorrelation {
    fn correlation_id(&self) -> Result<Option<String>> {
        Ok(current_correlation_id())
    }
}

impl<F> CorrelationIdProvider for F
where
    F: Fn() -> Result<Option<String>> + Send + Sync,
{
    fn correlation_id(&self) -> Result<Option<String>> {
        self()
    }
}

/// Correlation id from `provider`, with lookup failures and empty ids mapped to `None`
pub(crate) fn lookup_correlation_id(provider: &dyn CorrelationIdProvider) -> Option<String> {
    match provider.correlation_id() {
        Ok(Some(id)) if !id.is_empty() => Some(id),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, "correlation id lookup failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ObservabilityError;

    #[test]
    fn test_correlation_context_new() {
        let ctx = CorrelationContext::new();

        assert!(!ctx.request_id.is_empty());
        assert_eq!(ctx.trace_id.len(), 32);
        assert_eq!(ctx.span_id.len(), 16);
        assert!(ctx.parent_span_id.is_none());
    }

    #[test]
    fn test_correlation_context_child() {
        let parent = CorrelationContext::new().with_service("api");
        let child = parent.child();

        assert_eq!(parent.request_id, child.request_id);
        assert_eq!(parent.trace_id, child.trace_id);
        assert_ne!(parent.span_id, child.span_id);
        assert_eq!(child.parent_span_id, Some(parent.span_id.clone()));
        assert_eq!(child.service.as_deref(), Some("api"));
    }

    #[test]
    fn test_from_headers() {
        let headers = vec![
            ("X-Correlation-ID".to_string(), "req-123".to_string()),
            (
                "traceparent".to_string(),
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
            ),
            ("baggage-tenant".to_string(), "acme".to_string()),
        ];

        let ctx = CorrelationContext::from_headers(&headers);

        assert_eq!(ctx.request_id, "req-123");
        assert_eq!(ctx.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(ctx.parent_span_id.as_deref(), Some("00f067aa0ba902b7"));
        assert_eq!(ctx.baggage.get("tenant"), Some(&"acme".to_string()));
    }

    #[test]
    fn test_to_headers_round_trip_request_id() {
        let ctx = CorrelationContext::with_request_id("req-9").with_service("billing");
        let restored = CorrelationContext::from_headers(&ctx.to_headers());

        assert_eq!(restored.request_id, "req-9");
        assert_eq!(restored.trace_id, ctx.trace_id);
        assert_eq!(restored.service.as_deref(), Some("billing"));
    }

    #[test]
    fn test_context_guard() {
        let ctx1 = CorrelationContext::with_request_id("outer");
        let ctx2 = CorrelationContext::with_request_id("inner");

        set_current_context(ctx1);

        {
            let _guard = ContextGuard::enter(ctx2);
            assert_eq!(current_correlation_id().as_deref(), Some("inner"));
        }

        assert_eq!(current_correlation_id().as_deref(), Some("outer"));

        clear_current_context();
        assert!(current_correlation_id().is_none());
    }

    #[test]
    fn test_ambient_provider() {
        let _guard = ContextGuard::enter(CorrelationContext::with_request_id("req-42"));

        assert_eq!(
            AmbientCorrelation.correlation_id().unwrap().as_deref(),
            Some("req-42")
        );
    }

    #[test]
    fn test_lookup_swallows_failures() {
        let failing = || -> Result<Option<String>> {
            Err(ObservabilityError::Internal("context store unavailable".into()))
        };
        let empty = || -> Result<Option<String>> { Ok(Some(String::new())) };

        assert!(lookup_correlation_id(&failing).is_none());
        assert!(lookup_correlation_id(&empty).is_none());
    }
}
