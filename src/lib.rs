//! Dependency health monitoring with circuit breakers for healthcare services.

pub mod admin;
pub mod audit;
pub mod config;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod time;

pub use config::schema::MonitorConfig;
pub use health::HealthChecker;
pub use lifecycle::Shutdown;
pub use resilience::{CircuitBreaker, CircuitBreakerRegistry};
