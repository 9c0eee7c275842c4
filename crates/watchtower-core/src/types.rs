use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Severity shared by error events, alerts and log entries.
///
/// Variants are ordered from least to most severe, so `Severity::Critical > Severity::Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Critical)
    }
}

impl Default for Severity {
    fn default() -> Self {
        Self::Error
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            other => Err(CoreError::Validation(format!("unknown severity: {}", other))),
        }
    }
}

/// Deployment environment, each with a baseline sampling rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentEnvironment {
    Development,
    Staging,
    Production,
}

impl DeploymentEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }

    /// Default sampling rate for the environment.
    pub fn default_sample_rate(&self) -> f64 {
        match self {
            Self::Development => 1.0,
            Self::Staging => 0.5,
            Self::Production => 0.1,
        }
    }
}

impl Default for DeploymentEnvironment {
    fn default() -> Self {
        Self::Development
    }
}

impl std::fmt::Display for DeploymentEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentEnvironment {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" => Ok(Self::Production),
            other => Err(CoreError::InvalidEnvironment(other.to_string())),
        }
    }
}

/// Returns true if `rate` is a usable sampling rate (finite, within `[0.0, 1.0]`).
pub fn is_valid_rate(rate: f64) -> bool {
    rate.is_finite() && (0.0..=1.0).contains(&rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
        assert!(Severity::Critical.is_critical());
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!("INFO".parse::<Severity>().unwrap(), Severity::Info);
        assert_eq!("warn".parse::<Severity>().unwrap(), Severity::Warning);
        assert_eq!("critical".parse::<Severity>().unwrap(), Severity::Critical);
        assert!("fatal".parse::<Severity>().is_err());
    }

    #[test]
    fn test_severity_serde() {
        let json = serde_json::to_string(&Severity::Warning).unwrap();
        assert_eq!(json, "\"warning\"");
    }

    #[test]
    fn test_environment_rates() {
        assert_eq!(DeploymentEnvironment::Development.default_sample_rate(), 1.0);
        assert_eq!(DeploymentEnvironment::Staging.default_sample_rate(), 0.5);
        assert_eq!(DeploymentEnvironment::Production.default_sample_rate(), 0.1);
    }

    #[test]
    fn test_environment_from_str() {
        assert_eq!(
            "production".parse::<DeploymentEnvironment>().unwrap(),
            DeploymentEnvironment::Production
        );
        let err = "qa".parse::<DeploymentEnvironment>().unwrap_err();
        assert!(matches!(err, CoreError::InvalidEnvironment(name) if name == "qa"));
    }

    #[test]
    fn test_is_valid_rate() {
        assert!(is_valid_rate(0.0));
        assert!(is_valid_rate(1.0));
        assert!(is_valid_rate(0.25));
        assert!(!is_valid_rate(-0.1));
        assert!(!is_valid_rate(1.5));
        assert!(!is_valid_rate(f64::NAN));
    }
}
