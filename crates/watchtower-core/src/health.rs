//! Component health checks

use crate::error::{CoreError, Result};
use crate::repository::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

/// Health status, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct HealthCheck {
    pub id: Uuid,
    #[validate(length(min = 1, max = 255))]
    pub component: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub response_time_ms: Option<f64>,
    #[serde(default)]
    pub details: HashMap<String, serde_json::Value>,
    pub checked_at: DateTime<Utc>,
}

impl HealthCheck {
    pub fn new(component: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            component: component.into(),
            status,
            message: None,
            response_time_ms: None,
            details: HashMap::new(),
            checked_at: Utc::now(),
        }
    }

    pub fn healthy(component: impl Into<String>) -> Self {
        Self::new(component, HealthStatus::Healthy)
    }

    pub fn unhealthy(component: impl Into<String>, message: &str) -> Self {
        Self::new(component, HealthStatus::Unhealthy).with_message(message)
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    pub fn with_response_time(mut self, response_time_ms: f64) -> Self {
        self.response_time_ms = Some(response_time_ms);
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn check(&self) -> Result<()> {
        self.validate()?;
        if let Some(rt) = self.response_time_ms {
            if !rt.is_finite() || rt < 0.0 {
                return Err(CoreError::Validation(format!(
                    "health check for {} has invalid response time",
                    self.component
                )));
            }
        }
        Ok(())
    }
}

impl Entity for HealthCheck {
    fn id(&self) -> Uuid {
        self.id
    }
}
