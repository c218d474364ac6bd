// src/health/registry.rs
use super::Check;
use dashmap::DashMap;
use std::sync::Arc;

/// Named set of checks owned by a [`Checker`](super::Checker).
///
/// Registration may happen while an evaluation round is running; a round
/// works on the [`Registry::snapshot`] taken when it started.
#[derive(Clone, Default)]
pub struct Registry {
    checks: Arc<DashMap<String, Arc<dyn Check>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `check` under `name`, replacing any check previously
    /// registered with the same name.
    ///
    /// # Panics
    ///
    /// Panics when `name` is empty.
    pub fn register(&self, name: impl Into<String>, check: Arc<dyn Check>) {
        let name = name.into();
        assert!(!name.is_empty(), "health check name must not be empty");

        if self.checks.insert(name.clone(), check).is_some() {
            tracing::debug!("Replaced health check: {}", name);
        } else {
            tracing::debug!("Registered health check: {}", name);
        }
    }

    pub fn unregister(&self, name: &str) -> bool {
        if self.checks.remove(name).is_some() {
            tracing::debug!("Unregistered health check: {}", name);
            true
        } else {
            false
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Check>> {
        self.checks.get(name).map(|c| c.clone())
    }

    /// Clones the current registrations. Iteration order is unspecified.
    pub fn snapshot(&self) -> Vec<(String, Arc<dyn Check>)> {
        self.checks
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.checks.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("checks", &self.names())
            .finish()
    }
}
