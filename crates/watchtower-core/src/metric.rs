//! Metric records

use crate::error::{CoreError, Result};
use crate::repository::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

/// Metric kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Summary,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
            Self::Summary => "summary",
        }
    }
}

/// A single metric observation
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Metric {
    pub id: Uuid,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub value: f64,
    #[validate(length(max = 64))]
    pub unit: String,
    pub metric_type: MetricType,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: f64, metric_type: MetricType) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            value,
            unit: String::new(),
            metric_type,
            labels: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn counter(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, value, MetricType::Counter)
    }

    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, value, MetricType::Gauge)
    }

    pub fn histogram(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, value, MetricType::Histogram)
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = unit.to_string();
        self
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    /// Validate field constraints and value sanity
    pub fn check(&self) -> Result<()> {
        self.validate()?;

        if !self.value.is_finite() {
            return Err(CoreError::Validation(format!(
                "metric {} has non-finite value",
                self.name
            )));
        }
        if self.metric_type == MetricType::Counter && self.value < 0.0 {
            return Err(CoreError::Validation(format!(
                "counter {} cannot be negative",
                self.name
            )));
        }
        if self.labels.keys().any(|k| k.is_empty()) {
            return Err(CoreError::Validation(format!(
                "metric {} has an empty label name",
                self.name
            )));
        }

        Ok(())
    }
}

impl Entity for Metric {
    fn id(&self) -> Uuid {
        self.id
    }
}
