//! Shared utilities for integration tests.

#![allow(dead_code)]

use futures_util::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use health_guard::config::HealthCheckConfig;
use health_guard::health::{HealthCheckEvent, HealthChecker, HealthEventKind, HealthProbe, ProbeError, ServiceDependency};

/// One scripted probe outcome.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Ok,
    /// Succeed after the given delay.
    Slow(Duration),
    Fail,
}

/// Probe that replays a script, then repeats the last step.
pub struct ScriptedProbe {
    script: Mutex<VecDeque<Step>>,
    last: Mutex<Step>,
    calls: AtomicU32,
}

impl ScriptedProbe {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into_iter().collect()),
            last: Mutex::new(Step::Ok),
            calls: AtomicU32::new(0),
        })
    }

    /// Replace the remaining script.
    pub fn set(&self, steps: impl IntoIterator<Item = Step>) {
        *self.script.lock().unwrap() = steps.into_iter().collect();
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        let mut last = self.last.lock().unwrap();
        if let Some(step) = self.script.lock().unwrap().pop_front() {
            *last = step;
        }
        *last
    }
}

impl HealthProbe for ScriptedProbe {
    fn probe(&self, _: &ServiceDependency) -> BoxFuture<'static, Result<(), ProbeError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.next_step();
        Box::pin(async move {
            match step {
                Step::Ok => Ok(()),
                Step::Slow(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(())
                }
                Step::Fail => Err(ProbeError::Status(503)),
            }
        })
    }
}

/// Config with timers off; probes run only through `check_now`.
pub fn manual_config() -> HealthCheckConfig {
    HealthCheckConfig {
        enabled: false,
        ..HealthCheckConfig::default()
    }
}

/// Record event kinds as they are emitted.
pub fn record_events(checker: &HealthChecker) -> Arc<Mutex<Vec<(String, HealthEventKind)>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    checker.on_event(move |event: &HealthCheckEvent| {
        sink.lock().unwrap().push((event.service.clone(), event.kind));
    });
    seen
}

pub fn kinds(events: &Arc<Mutex<Vec<(String, HealthEventKind)>>>) -> Vec<HealthEventKind> {
    events.lock().unwrap().iter().map(|(_, k)| *k).collect()
}
