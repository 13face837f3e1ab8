//! Configuration file watcher for hot reload.
//!
//! # Data Flow
//! ```text
//! file modified
//!     → load_config (parse + validate)
//!     → channel to the daemon
//!     → apply_reload: diff services, swap checker thresholds
//! ```
//!
//! Invalid files are logged and ignored; the running configuration stays.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::MonitorConfig;
use crate::health::{HealthChecker, ServiceDependency};

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<MonitorConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configurations.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<MonitorConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!(path = ?path, "Config file change detected, reloading");
                        match load_config(&path) {
                            Ok(new_config) => {
                                let _ = tx.send(new_config);
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                            }
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Services to start and stop when moving between two configurations.
///
/// A service whose definition changed appears in both lists.
#[derive(Debug, Default, PartialEq)]
pub struct ServiceChanges {
    pub removed: Vec<String>,
    pub added: Vec<ServiceDependency>,
}

impl ServiceChanges {
    pub fn between(current: &[ServiceDependency], next: &[ServiceDependency]) -> Self {
        let removed = current
            .iter()
            .filter(|old| !next.contains(old))
            .map(|old| old.name.clone())
            .collect();
        let added = next
            .iter()
            .filter(|new| !current.contains(new))
            .cloned()
            .collect();
        Self { removed, added }
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Bring a running checker from `current` to `next`.
pub fn apply_reload(checker: &HealthChecker, current: &MonitorConfig, next: &MonitorConfig) {
    if current.health_check != next.health_check {
        checker.update_config(next.health_check.clone());
    }

    let changes = ServiceChanges::between(&current.services, &next.services);
    for name in &changes.removed {
        checker.unregister_service(name);
    }
    for dependency in changes.added {
        let name = dependency.name.clone();
        if let Err(e) = checker.register_service(dependency) {
            tracing::error!(service = %name, error = %e, "Failed to register service on reload");
        }
    }

    if current.observability != next.observability || current.admin != next.admin || current.audit != next.audit {
        tracing::warn!("Observability, admin and audit settings take effect after restart");
    }
}
