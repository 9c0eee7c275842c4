//! Structured log records

use crate::error::Result;
use crate::repository::Entity;
use crate::types::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LogEntry {
    pub id: Uuid,
    pub level: Severity,
    #[validate(length(min = 1))]
    pub message: String,
    #[validate(length(min = 1, max = 255))]
    pub logger: String,
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub fields: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(level: Severity, logger: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            level,
            message: message.into(),
            logger: logger.into(),
            correlation_id: None,
            fields: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn info(logger: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, logger, message)
    }

    pub fn error(logger: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, logger, message)
    }

    pub fn with_correlation_id(mut self, correlation_id: &str) -> Self {
        self.correlation_id = Some(correlation_id.to_string());
        self
    }

    pub fn with_field(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn check(&self) -> Result<()> {
        self.validate()?;
        Ok(())
    }
}

impl Entity for LogEntry {
    fn id(&self) -> Uuid {
        self.id
    }
}
