//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds ≥ 1, timeouts > 0)
//! - Check cross-field consistency (warning < critical, overall ≥ request)
//! - Detect duplicate service names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MonitorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::{CircuitBreakerConfig, MonitorConfig};

/// One semantic problem, located by a dotted field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &MonitorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let hc = &config.health_check;

    if hc.check_interval_ms == 0 {
        errors.push(ValidationError::new("health_check.check_interval_ms", "must be greater than 0"));
    }
    if hc.response_time_warning_ms >= hc.response_time_critical_ms {
        errors.push(ValidationError::new(
            "health_check.response_time_warning_ms",
            "must be less than response_time_critical_ms",
        ));
    }

    validate_breaker("health_check.critical_breaker", &hc.breaker_config(true), &mut errors);
    validate_breaker("health_check.standard_breaker", &hc.breaker_config(false), &mut errors);

    let mut seen = HashSet::new();
    for (i, service) in config.services.iter().enumerate() {
        let field = format!("services[{}]", i);
        if service.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("{}.name", field), "must not be empty"));
        } else if !seen.insert(service.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.name", field),
                format!("duplicate service name '{}'", service.name),
            ));
        }
        if service.endpoint.trim().is_empty() {
            errors.push(ValidationError::new(format!("{}.endpoint", field), "must not be empty"));
        }
    }

    if config.admin.enabled && config.admin.api_key.is_empty() {
        errors.push(ValidationError::new("admin.api_key", "must be set when the admin API is enabled"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_breaker(prefix: &str, breaker: &CircuitBreakerConfig, errors: &mut Vec<ValidationError>) {
    if breaker.failure_threshold < 1 {
        errors.push(ValidationError::new(format!("{}.failure_threshold", prefix), "must be at least 1"));
    }
    if breaker.retry_backoff_multiplier < 1.0 {
        errors.push(ValidationError::new(
            format!("{}.retry_backoff_multiplier", prefix),
            "must be at least 1.0",
        ));
    }
    if breaker.request_timeout_ms == 0 {
        errors.push(ValidationError::new(format!("{}.request_timeout_ms", prefix), "must be greater than 0"));
    }
    if breaker.overall_timeout_ms == 0 {
        errors.push(ValidationError::new(format!("{}.overall_timeout_ms", prefix), "must be greater than 0"));
    } else if breaker.overall_timeout_ms < breaker.request_timeout_ms {
        errors.push(ValidationError::new(
            format!("{}.overall_timeout_ms", prefix),
            "must not be less than request_timeout_ms",
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{DependencyType, ServiceDependency};

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&MonitorConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = MonitorConfig::default();
        config.health_check.check_interval_ms = 0;
        config.health_check.response_time_warning_ms = 5_000;
        config.health_check.critical_breaker.failure_threshold = Some(0);
        config.health_check.standard_breaker.retry_backoff_multiplier = Some(0.5);
        config.services = vec![
            ServiceDependency::new("records", DependencyType::Database, "db:5432"),
            ServiceDependency::new("records", DependencyType::Cache, ""),
            ServiceDependency::new(" ", DependencyType::Api, "http://x"),
        ];
        config.admin.enabled = true;
        config.admin.api_key.clear();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "health_check.check_interval_ms",
                "health_check.response_time_warning_ms",
                "health_check.critical_breaker.failure_threshold",
                "health_check.standard_breaker.retry_backoff_multiplier",
                "services[1].name",
                "services[1].endpoint",
                "services[2].name",
                "admin.api_key",
            ]
        );
    }

    #[test]
    fn test_overall_timeout_below_request_timeout() {
        let mut config = MonitorConfig::default();
        config.health_check.standard_breaker.overall_timeout_ms = Some(1_000);
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "health_check.standard_breaker.overall_timeout_ms");
    }
}
