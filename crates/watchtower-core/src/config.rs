use crate::error::{CoreError, Result};
use crate::types::{is_valid_rate, DeploymentEnvironment};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;

/// Observability configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default)]
    pub sampling: SamplingSettings,
    #[serde(default)]
    pub alerting: AlertingSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            environment: default_environment(),
            sampling: SamplingSettings::default(),
            alerting: AlertingSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl ObservabilityConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_env("WATCHTOWER")
    }

    /// Load configuration from environment with custom prefix
    pub fn load_from_env(prefix: &str) -> Result<Self> {
        let builder = Config::builder()
            .add_source(
                Environment::with_prefix(prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .set_default("service_name", default_service_name())?
            .set_default("environment", default_environment())?
            .set_default("alerting.cooldown_seconds", default_cooldown_seconds())?
            .set_default(
                "alerting.escalation_threshold",
                i64::from(default_escalation_threshold()),
            )?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.json", false)?
            .set_default("logging.colored", true)?
            .set_default("logging.span_events", false)?;

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment overrides
    pub fn load_from_file(path: &str) -> Result<Self> {
        let builder = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("WATCHTOWER")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parsed deployment environment
    pub fn deployment_environment(&self) -> Result<DeploymentEnvironment> {
        self.environment.parse()
    }

    /// Check every value is within its allowed range
    pub fn validate(&self) -> Result<()> {
        if self.service_name.trim().is_empty() {
            return Err(CoreError::Validation("service_name must not be empty".into()));
        }

        self.deployment_environment()?;

        if let Some(rate) = self.sampling.default_rate {
            check_rate("sampling.default_rate", rate)?;
        }
        for (service, rate) in &self.sampling.service_rates {
            check_rate(&format!("sampling.service_rates.{}", service), *rate)?;
        }
        for (operation, rate) in &self.sampling.operation_rates {
            check_rate(&format!("sampling.operation_rates.{}", operation), *rate)?;
        }

        let cooldown = self.alerting.cooldown_seconds;
        if !cooldown.is_finite() || cooldown < 0.0 {
            return Err(CoreError::Validation(format!(
                "alerting.cooldown_seconds must be >= 0, got {}",
                cooldown
            )));
        }
        if self.alerting.escalation_threshold < 1 {
            return Err(CoreError::Validation(
                "alerting.escalation_threshold must be >= 1".into(),
            ));
        }

        Ok(())
    }
}

fn check_rate(key: &str, rate: f64) -> Result<()> {
    if is_valid_rate(rate) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "{} must be within [0.0, 1.0], got {}",
            key, rate
        )))
    }
}

fn default_service_name() -> String {
    "watchtower".to_string()
}

fn default_environment() -> String {
    DeploymentEnvironment::default().as_str().to_string()
}

/// Sampling rate overrides. `default_rate` of `None` means "use the environment's rate".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SamplingSettings {
    #[serde(default)]
    pub default_rate: Option<f64>,
    #[serde(default)]
    pub service_rates: HashMap<String, f64>,
    #[serde(default)]
    pub operation_rates: HashMap<String, f64>,
}

impl SamplingSettings {
    pub fn with_default_rate(mut self, rate: f64) -> Self {
        self.default_rate = Some(rate);
        self
    }

    pub fn with_service_rate(mut self, service: &str, rate: f64) -> Self {
        self.service_rates.insert(service.to_string(), rate);
        self
    }

    pub fn with_operation_rate(mut self, operation: &str, rate: f64) -> Self {
        self.operation_rates.insert(operation.to_string(), rate);
        self
    }
}

/// Alert deduplication settings
#[derive(Debug, Clone, Deserialize)]
pub struct AlertingSettings {
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: f64,
    #[serde(default = "default_escalation_threshold")]
    pub escalation_threshold: u32,
}

impl Default for AlertingSettings {
    fn default() -> Self {
        Self {
            cooldown_seconds: default_cooldown_seconds(),
            escalation_threshold: default_escalation_threshold(),
        }
    }
}

fn default_cooldown_seconds() -> f64 {
    60.0
}

fn default_escalation_threshold() -> u32 {
    5
}

/// Log output settings
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    #[serde(default = "default_colored")]
    pub colored: bool,
    #[serde(default)]
    pub span_events: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            colored: default_colored(),
            span_events: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_colored() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ObservabilityConfig::default();

        assert_eq!(config.service_name, "watchtower");
        assert_eq!(config.environment, "development");
        assert_eq!(config.alerting.cooldown_seconds, 60.0);
        assert_eq!(config.alerting.escalation_threshold, 5);
        assert_eq!(config.logging.level, "info");
        assert!(config.sampling.default_rate.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_env_defaults() {
        let config = ObservabilityConfig::load_from_env("WATCHTOWER_TEST_UNSET_PREFIX").unwrap();

        assert_eq!(config.service_name, "watchtower");
        assert_eq!(
            config.deployment_environment().unwrap(),
            DeploymentEnvironment::Development
        );
        assert_eq!(config.alerting.cooldown_seconds, 60.0);
        assert_eq!(config.alerting.escalation_threshold, 5);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
service_name = "checkout"
environment = "production"

[sampling]
default_rate = 0.2

[sampling.operation_rates]
login = 1.0

[alerting]
cooldown_seconds = 30.0
escalation_threshold = 3
"#
        )
        .unwrap();

        let config = ObservabilityConfig::load_from_file(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.service_name, "checkout");
        assert_eq!(
            config.deployment_environment().unwrap(),
            DeploymentEnvironment::Production
        );
        assert_eq!(config.sampling.default_rate, Some(0.2));
        assert_eq!(config.sampling.operation_rates.get("login"), Some(&1.0));
        assert_eq!(config.alerting.escalation_threshold, 3);
        assert!(!config.logging.json);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ObservabilityConfig::default();
        config.environment = "qa".to_string();
        assert!(matches!(config.validate(), Err(CoreError::InvalidEnvironment(_))));

        let mut config = ObservabilityConfig::default();
        config.sampling = SamplingSettings::default().with_service_rate("api", 1.5);
        assert!(config.validate().is_err());

        let mut config = ObservabilityConfig::default();
        config.alerting.cooldown_seconds = -1.0;
        assert!(config.validate().is_err());

        let mut config = ObservabilityConfig::default();
        config.alerting.escalation_threshold = 0;
        assert!(config.validate().is_err());
    }
}
