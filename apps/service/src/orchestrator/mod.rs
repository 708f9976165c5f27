//! Orchestrator module - the monitor loop and transition engine
//!
//! Each cycle the monitor:
//! - Loads the state persisted by the previous cycle (or previous process)
//! - Runs every target's check, one at a time, in configuration order
//! - Fires the target's alert when its status differs from the stored one
//! - Saves a freshly built state holding only the configured targets
//!
//! A target seen for the first time only records a baseline. Check and alert
//! failures are logged and never escape a cycle.


use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::TargetDefinition;
use crate::monitoring::{AlertRegistry, CheckRegistry};
use crate::state::{StateMap, StateStore, StatusRecord};

/// Direction of a status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Down,
    Recovered,
}

impl Transition {
    fn from_status(is_up: bool) -> Self {
        if is_up { Transition::Recovered } else { Transition::Down }
    }

    /// Alert text for `target`
    pub fn message(&self, target: &TargetDefinition) -> String {
        match self {
            Transition::Down => {
                format!("System {} is DOWN. Check type: {}", target.name, target.check_kind)
            }
            Transition::Recovered => {
                format!("System {} has RECOVERED. Check type: {}", target.name, target.check_kind)
            }
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transition::Down => write!(f, "DOWN"),
            Transition::Recovered => write!(f, "RECOVERED"),
        }
    }
}

/// What happened to one target during a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Up,
    Down,
    /// The target could not be evaluated; its previous record was kept
    Skipped(String),
}

#[derive(Debug, Clone)]
pub struct TargetResult {
    pub name: String,
    pub host: String,
    pub outcome: Outcome,
    pub transition: Option<Transition>,
}

/// Summary of a single evaluation pass
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub results: Vec<TargetResult>,
    pub alerts_sent: usize,
    pub alerts_failed: usize,
    pub state_saved: bool,
}

impl CycleReport {
    pub fn transitions(&self) -> impl Iterator<Item = (&str, Transition)> {
        self.results.iter().filter_map(|r| r.transition.map(|t| (r.name.as_str(), t)))
    }

    pub fn skipped(&self) -> usize {
        self.results.iter().filter(|r| matches!(r.outcome, Outcome::Skipped(_))).count()
    }

    pub fn all_up(&self) -> bool {
        self.results.iter().all(|r| r.outcome == Outcome::Up)
    }
}

/// Monitor loop over a set of targets
pub struct Monitor {
    checks: CheckRegistry,
    alerts: AlertRegistry,
    store: Arc<dyn StateStore>,
}

impl Monitor {
    pub fn new(checks: CheckRegistry, alerts: AlertRegistry, store: Arc<dyn StateStore>) -> Self {
        Self { checks, alerts, store }
    }

    /// Run a single evaluation pass over `targets`
    pub async fn run_cycle(&self, targets: &[TargetDefinition]) -> CycleReport {
        let prior = self.store.load().unwrap_or_else(|e| {
            error!("Failed to load state, treating every target as new: {}", e);
            StateMap::new()
        });

        // Rebuilt from scratch so that removed targets drop out of the store
        let mut next = StateMap::new();
        let mut report = CycleReport::default();
        let now = chrono::Utc::now().timestamp();

        for target in targets {
            let previous = prior.get(&target.name).copied();
            let result = self.evaluate(target, previous, now, &mut report).await;

            match (&result.outcome, previous) {
                (Outcome::Up | Outcome::Down, _) => {
                    let is_up = result.outcome == Outcome::Up;
                    let record = match previous {
                        Some(record) if record.is_up == is_up => record,
                        _ => StatusRecord::new(is_up, now),
                    };
                    next.insert(target.name.clone(), record);
                }
                (Outcome::Skipped(_), Some(record)) => {
                    next.insert(target.name.clone(), record);
                }
                (Outcome::Skipped(_), None) => {}
            }

            report.results.push(result);
        }

        match self.store.save(&next) {
            Ok(()) => report.state_saved = true,
            Err(e) => error!("Failed to save state: {}", e),
        }

        debug!(
            targets = targets.len(),
            skipped = report.skipped(),
            alerts_sent = report.alerts_sent,
            alerts_failed = report.alerts_failed,
            "Cycle complete"
        );
        report
    }

    async fn evaluate(
        &self,
        target: &TargetDefinition,
        previous: Option<StatusRecord>,
        now: i64,
        report: &mut CycleReport,
    ) -> TargetResult {
        let mut result = TargetResult {
            name: target.name.clone(),
            host: target.host.clone(),
            outcome: Outcome::Skipped(String::new()),
            transition: None,
        };

        let strategies = self
            .checks
            .resolve(&target.check_kind)
            .and_then(|check| Ok((check, self.alerts.resolve(&target.alert_kind)?)));
        let (check, alert) = match strategies {
            Ok(strategies) => strategies,
            Err(e) => {
                error!(target_name = %target.name, "Skipping target: {}", e);
                result.outcome = Outcome::Skipped(e.to_string());
                return result;
            }
        };

        let is_up = match check.check(&target.host, &target.options).await {
            Ok(is_up) => is_up,
            Err(e) => {
                error!(target_name = %target.name, host = %target.host, "Check could not run: {}", e);
                result.outcome = Outcome::Skipped(e.to_string());
                return result;
            }
        };
        result.outcome = if is_up { Outcome::Up } else { Outcome::Down };

        let Some(previous) = previous else {
            info!(
                target_name = %target.name,
                host = %target.host,
                "Initial status: {}",
                if is_up { "UP" } else { "DOWN" }
            );
            return result;
        };

        if previous.is_up == is_up {
            debug!(target_name = %target.name, host = %target.host, is_up, "Status unchanged");
            return result;
        }

        let transition = Transition::from_status(is_up);
        let held_for = now.saturating_sub(previous.last_change);
        match transition {
            Transition::Down => {
                warn!(target_name = %target.name, host = %target.host, up_for_secs = held_for, "ALERT: target is DOWN")
            }
            Transition::Recovered => {
                info!(target_name = %target.name, host = %target.host, down_for_secs = held_for, "RECOVERED: target is back UP")
            }
        }

        let message = transition.message(target);
        match alert.send_alert(&target.name, &target.host, &message, &target.options).await {
            Ok(()) => report.alerts_sent += 1,
            Err(e) => {
                report.alerts_failed += 1;
                error!(
                    target_name = %target.name,
                    alert = %target.alert_kind,
                    "Failed to send alert: {:#}",
                    e
                );
            }
        }

        result.transition = Some(transition);
        result
    }

    /// Run cycles forever, sleeping `interval` between them, until `shutdown`
    /// resolves. A cycle in progress is always completed first.
    pub async fn run_until<F>(
        &self,
        targets: &[TargetDefinition],
        interval: Duration,
        shutdown: impl Future<Output = ()>,
        mut on_cycle: F,
    ) where
        F: FnMut(&CycleReport),
    {
        tokio::pin!(shutdown);
        info!("Starting watcher... Monitoring {} systems", targets.len());

        loop {
            let report = self.run_cycle(targets).await;
            on_cycle(&report);

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = &mut shutdown => {
                    info!("Shutdown requested, exiting watcher");
                    break;
                }
            }
        }
    }
}
