//! Alerts raised from repeated or critical errors

use crate::error::{CoreError, Result};
use crate::repository::Entity;
use crate::types::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Alert lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Alert {
    pub id: Uuid,
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub status: AlertStatus,
    /// Fingerprint of the error that raised the alert, if any
    pub fingerprint: Option<String>,
    #[validate(length(min = 1))]
    pub source: String,
    pub occurrences: u64,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new(title: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            message: message.into(),
            severity,
            status: AlertStatus::Active,
            fingerprint: None,
            source: "watchtower".to_string(),
            occurrences: 1,
            created_at: Utc::now(),
            acknowledged_at: None,
            resolved_at: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: &str) -> Self {
        self.fingerprint = Some(fingerprint.to_string());
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    pub fn with_occurrences(mut self, occurrences: u64) -> Self {
        self.occurrences = occurrences;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }

    /// Mark the alert as seen. Resolved alerts cannot be acknowledged.
    pub fn acknowledge(&mut self) -> Result<()> {
        match self.status {
            AlertStatus::Active => {
                self.status = AlertStatus::Acknowledged;
                self.acknowledged_at = Some(Utc::now());
                Ok(())
            }
            AlertStatus::Acknowledged => Ok(()),
            AlertStatus::Resolved => Err(CoreError::InvalidTransition(format!(
                "alert {} is already resolved",
                self.id
            ))),
        }
    }

    /// Close the alert. Resolving twice is a no-op.
    pub fn resolve(&mut self) {
        if self.status != AlertStatus::Resolved {
            self.status = AlertStatus::Resolved;
            self.resolved_at = Some(Utc::now());
        }
    }

    pub fn check(&self) -> Result<()> {
        self.validate()?;
        if self.occurrences == 0 {
            return Err(CoreError::Validation("alert occurrences must be >= 1".into()));
        }
        Ok(())
    }
}

impl Entity for Alert {
    fn id(&self) -> Uuid {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_lifecycle() {
        let mut alert = Alert::new("Database timeout", "query exceeded 5s", Severity::Error);
        assert!(alert.is_active());

        alert.acknowledge().unwrap();
        assert_eq!(alert.status, AlertStatus::Acknowledged);
        assert!(alert.acknowledged_at.is_some());

        alert.resolve();
        assert_eq!(alert.status, AlertStatus::Resolved);
        assert!(alert.resolved_at.is_some());
    }

    #[test]
    fn test_acknowledge_resolved_fails() {
        let mut alert = Alert::new("t", "m", Severity::Warning);
        alert.resolve();

        assert!(matches!(alert.acknowledge(), Err(CoreError::InvalidTransition(_))));
    }

    #[test]
    fn test_alert_validation() {
        assert!(Alert::new("ok", "m", Severity::Info).check().is_ok());
        assert!(Alert::new("", "m", Severity::Info).check().is_err());
        assert!(Alert::new("t", "m", Severity::Info)
            .with_occurrences(0)
            .check()
            .is_err());
    }
}
