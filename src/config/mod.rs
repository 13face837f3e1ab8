//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → MonitorConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → apply_reload: services diffed, thresholds swapped atomically
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Breaker settings are presets with optional per-field overrides
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, AuditConfig, AuditSinkKind, BreakerOverrides, CircuitBreakerConfig, HealthCheckConfig, LogFormat,
    MonitorConfig, ObservabilityConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::{apply_reload, ConfigWatcher, ServiceChanges};
