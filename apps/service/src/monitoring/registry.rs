use std::collections::HashMap;
use std::sync::Arc;

use crate::alerts::{Alerter, EmailAlerter, LogAlerter};
use crate::config::Settings;
use crate::error::WatchError;

use super::checker::{Checker, HttpChecker, PingChecker};

/// Strategies keyed by the name used in the configuration file
pub struct Registry<S: ?Sized> {
    strategies: HashMap<String, Arc<S>>,
}

impl<S: ?Sized> Default for Registry<S> {
    fn default() -> Self {
        Self { strategies: HashMap::new() }
    }
}

impl<S: ?Sized> Registry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `strategy` under `name`, replacing any previous entry
    pub fn register(&mut self, name: impl Into<String>, strategy: Arc<S>) -> &mut Self {
        self.strategies.insert(name.into(), strategy);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<S>> {
        self.strategies.get(name).cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.strategies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

pub type CheckRegistry = Registry<dyn Checker>;
pub type AlertRegistry = Registry<dyn Alerter>;

impl Registry<dyn Checker> {
    /// Registry holding the built-in `ping` and `http` checks
    pub fn with_builtins(settings: &Settings) -> anyhow::Result<Self> {
        let mut registry = Self::new();
        registry
            .register("ping", Arc::new(PingChecker::new(settings.timeout)))
            .register("http", Arc::new(HttpChecker::new(settings.timeout)?));
        Ok(registry)
    }

    pub fn resolve(&self, kind: &str) -> Result<Arc<dyn Checker>, WatchError> {
        self.get(kind).ok_or_else(|| WatchError::UnknownCheck(kind.to_string()))
    }
}

impl Registry<dyn Alerter> {
    /// Registry holding the built-in `email` and `log` alerts
    pub fn with_builtins(settings: &Settings) -> Self {
        let mut registry = Self::new();
        registry
            .register("email", Arc::new(EmailAlerter::new(&settings.recipient, &settings.mail_command)))
            .register("log", Arc::new(LogAlerter));
        registry
    }

    pub fn resolve(&self, kind: &str) -> Result<Arc<dyn Alerter>, WatchError> {
        self.get(kind).ok_or_else(|| WatchError::UnknownAlert(kind.to_string()))
    }
}
