//! Core types, models and configuration for Watchtower
//!
//! Shared vocabulary for the observability crates: severities, deployment
//! environments, validated entity models, repositories and configuration.

pub mod alert;
pub mod config;
pub mod error;
pub mod health;
pub mod log_entry;
pub mod metric;
pub mod repository;
pub mod trace;
pub mod types;

pub use crate::config::*;
pub use error::*;
pub use types::*;

pub use alert::{Alert, AlertStatus};
pub use health::{HealthCheck, HealthStatus};
pub use log_entry::LogEntry;
pub use metric::{Metric, MetricType};
pub use repository::{Entity, InMemoryRepository, Repository};
pub use trace::{Trace, TraceStatus};
