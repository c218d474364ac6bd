// src/health/notifier.rs
use super::Status;
use std::collections::BTreeMap;

/// Receives aggregate status transitions from a [`Checker`](super::Checker).
///
/// Called synchronously, once per round in which the published status
/// changed, after the new status is visible through `Checker::status`.
/// Deliveries never overlap.
pub trait Notifier: Send + Sync {
    fn health_changed(&self, status: Status, old: Status, details: &BTreeMap<String, Status>);
}

/// Adapts a closure into a [`Notifier`].
pub struct NotifierFn<F>(F);

pub fn notifier_fn<F>(f: F) -> NotifierFn<F>
where
    F: Fn(Status, Status, &BTreeMap<String, Status>) + Send + Sync,
{
    NotifierFn(f)
}

impl<F> Notifier for NotifierFn<F>
where
    F: Fn(Status, Status, &BTreeMap<String, Status>) + Send + Sync,
{
    fn health_changed(&self, status: Status, old: Status, details: &BTreeMap<String, Status>) {
        (self.0)(status, old, details)
    }
}

/// Logs transitions through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn health_changed(&self, status: Status, old: Status, details: &BTreeMap<String, Status>) {
        if status.is_healthy() {
            tracing::info!(%old, %status, "Health changed from {} to {}", old, status);
            return;
        }

        let failing: Vec<&str> = details
            .iter()
            .filter(|(_, s)| !s.is_healthy())
            .map(|(name, _)| name.as_str())
            .collect();
        tracing::warn!(
            %old,
            %status,
            ?failing,
            "Health changed from {} to {}",
            old,
            status
        );
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NopNotifier;

impl Notifier for NopNotifier {
    fn health_changed(&self, _: Status, _: Status, _: &BTreeMap<String, Status>) {}
}
