//! Trace spans

use crate::error::{CoreError, Result};
use crate::repository::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

/// Span completion status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    Unset,
    Ok,
    Error,
}

impl Default for TraceStatus {
    fn default() -> Self {
        Self::Unset
    }
}

/// A timed unit of work within a trace
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Trace {
    pub id: Uuid,
    #[validate(length(min = 1))]
    pub trace_id: String,
    #[validate(length(min = 1))]
    pub span_id: String,
    pub parent_span_id: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub operation: String,
    #[validate(length(min = 1, max = 255))]
    pub service: String,
    pub status: TraceStatus,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<f64>,
}

impl Trace {
    /// Start a new root span with fresh trace and span ids
    pub fn start(operation: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            trace_id: Uuid::new_v4().simple().to_string(),
            span_id: generate_span_id(),
            parent_span_id: None,
            operation: operation.into(),
            service: service.into(),
            status: TraceStatus::Unset,
            attributes: HashMap::new(),
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
        }
    }

    /// Join an existing trace as a child of `parent_span_id`
    pub fn with_parent(mut self, trace_id: &str, parent_span_id: Option<&str>) -> Self {
        self.trace_id = trace_id.to_string();
        self.parent_span_id = parent_span_id.map(str::to_string);
        self
    }

    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    /// Close the span, recording end time and duration
    pub fn finish(&mut self, status: TraceStatus) {
        let end = Utc::now();
        self.status = status;
        self.end_time = Some(end);
        let micros = (end - self.start_time).num_microseconds().unwrap_or(0);
        self.duration_ms = Some(micros as f64 / 1000.0);
    }

    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn check(&self) -> Result<()> {
        self.validate()?;

        if let Some(end) = self.end_time {
            if end < self.start_time {
                return Err(CoreError::Validation(format!(
                    "span {} ends before it starts",
                    self.span_id
                )));
            }
        }
        if let Some(duration) = self.duration_ms {
            if !duration.is_finite() || duration < 0.0 {
                return Err(CoreError::Validation(format!(
                    "span {} has invalid duration",
                    self.span_id
                )));
            }
        }

        Ok(())
    }
}

impl Entity for Trace {
    fn id(&self) -> Uuid {
        self.id
    }
}

fn generate_span_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_trace_start() {
        let trace = Trace::start("GET /users", "api");

        assert_eq!(trace.trace_id.len(), 32);
        assert_eq!(trace.span_id.len(), 16);
        assert!(trace.parent_span_id.is_none());
        assert!(!trace.is_finished());
        assert!(trace.check().is_ok());
    }

    #[test]
    fn test_trace_finish() {
        let mut trace = Trace::start("GET /users", "api").with_attribute("http.status", "200");
        trace.finish(TraceStatus::Ok);

        assert!(trace.is_finished());
        assert_eq!(trace.status, TraceStatus::Ok);
        assert!(trace.duration_ms.unwrap() >= 0.0);
        assert!(trace.check().is_ok());
    }

    #[test]
    fn test_trace_with_parent() {
        let trace = Trace::start("db.query", "api").with_parent("abc123", Some("00f1"));

        assert_eq!(trace.trace_id, "abc123");
        assert_eq!(trace.parent_span_id.as_deref(), Some("00f1"));
    }

    #[test]
    fn test_trace_rejects_end_before_start() {
        let mut trace = Trace::start("op", "svc");
        trace.end_time = Some(trace.start_time - Duration::seconds(1));

        assert!(trace.check().is_err());
    }

    #[test]
    fn test_trace_rejects_empty_operation() {
        assert!(Trace::start("", "svc").check().is_err());
    }
}
