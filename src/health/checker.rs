// src/health/checker.rs
use super::{AtomicStatus, Check, CheckContext, Notifier, Registry, Status, Tally};
use crate::config::CheckerSettings;
use crate::metrics::{HealthMetrics, Timer};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Duration, Instant};
use tracing::{debug, error, warn, Instrument};
use uuid::Uuid;

/// Default upper bound for a single evaluation round.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// [`ParallelMode::Auto`] fans out once more checks than this are registered.
pub const PARALLEL_THRESHOLD: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParallelMode {
    #[default]
    Auto,
    Always,
    Never,
}

impl ParallelMode {
    /// Whether a round over `checks` registered checks runs them concurrently.
    /// A single check always runs inline.
    pub fn is_parallel(self, checks: usize) -> bool {
        if checks <= 1 {
            return false;
        }
        match self {
            ParallelMode::Auto => checks > PARALLEL_THRESHOLD,
            ParallelMode::Always => true,
            ParallelMode::Never => false,
        }
    }
}

/// Result of the most recent evaluation round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub status: Status,
    pub details: BTreeMap<String, Status>,
    pub checked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid checker options: {}", .0.join("; "))]
pub struct BuildError(pub Vec<String>);

#[derive(Default)]
pub struct CheckerBuilder {
    timeout: Option<Duration>,
    parallel: ParallelMode,
    checks: Vec<(String, Arc<dyn Check>)>,
    notifier: Option<Arc<dyn Notifier>>,
    metrics: Option<Arc<HealthMetrics>>,
}

impl CheckerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &CheckerSettings) -> Self {
        Self::new()
            .timeout(settings.timeout())
            .parallel(settings.parallel)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn parallel(mut self, mode: ParallelMode) -> Self {
        self.parallel = mode;
        self
    }

    pub fn check(mut self, name: impl Into<String>, check: Arc<dyn Check>) -> Self {
        self.checks.push((name.into(), check));
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn metrics(mut self, metrics: Arc<HealthMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the checker, reporting every invalid option at once.
    pub fn build(self) -> Result<Checker, BuildError> {
        let mut errors = Vec::new();

        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            errors.push("timeout must be greater than zero".to_string());
        }
        for (i, (name, _)) in self.checks.iter().enumerate() {
            if name.is_empty() {
                errors.push(format!("check #{} has an empty name", i));
            }
        }
        if !errors.is_empty() {
            return Err(BuildError(errors));
        }

        let registry = Registry::new();
        for (name, check) in self.checks {
            registry.register(name, check);
        }

        Ok(Checker {
            registry,
            timeout,
            parallel: self.parallel,
            notifier: self.notifier,
            metrics: self.metrics,
            status: AtomicStatus::default(),
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            rounds: AtomicU64::new(0),
            published: Mutex::new(0),
        })
    }
}

/// Aggregates the statuses of all registered checks into one status.
pub struct Checker {
    registry: Registry,
    timeout: Duration,
    parallel: ParallelMode,
    notifier: Option<Arc<dyn Notifier>>,
    metrics: Option<Arc<HealthMetrics>>,

    // Published state of the last round
    status: AtomicStatus,
    snapshot: ArcSwap<Snapshot>,
    rounds: AtomicU64,
    // Sequence number of the published round
    published: Mutex<u64>,
}

impl Checker {
    pub fn builder() -> CheckerBuilder {
        CheckerBuilder::new()
    }

    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            timeout: DEFAULT_TIMEOUT,
            parallel: ParallelMode::default(),
            notifier: None,
            metrics: None,
            status: AtomicStatus::default(),
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            rounds: AtomicU64::new(0),
            published: Mutex::new(0),
        }
    }

    /// See [`Registry::register`].
    pub fn register(&self, name: impl Into<String>, check: Arc<dyn Check>) {
        self.registry.register(name, check);
    }

    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.registry.unregister(name);
        if removed {
            if let Some(metrics) = &self.metrics {
                metrics.remove_check(name);
            }
        }
        removed
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn parallel_mode(&self) -> ParallelMode {
        self.parallel
    }

    /// Status published by the most recent round.
    ///
    /// Read independently of [`Checker::details`]; a round may publish between
    /// the two calls. Use [`Checker::snapshot`] for a consistent pair.
    pub fn status(&self) -> Status {
        self.status.load()
    }

    /// Status and per-check statuses of the same round.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    /// Per-check statuses of the most recent round. See [`Checker::status`]
    /// on pairing the two.
    pub fn details(&self) -> BTreeMap<String, Status> {
        self.snapshot.load().details.clone()
    }

    /// Runs every registered check once and publishes the combined status.
    ///
    /// The round is bounded by the tighter of `deadline` and the configured
    /// timeout. Checks that do not finish in time are recorded as
    /// [`Status::Unknown`]. When rounds overlap, a round that started before
    /// the last published one returns its result without publishing it.
    pub async fn evaluate(&self, deadline: Option<Instant>) -> (Status, BTreeMap<String, Status>) {
        let round = Uuid::new_v4();
        self.run_round(deadline)
            .instrument(tracing::debug_span!("health_round", %round))
            .await
    }

    async fn run_round(&self, deadline: Option<Instant>) -> (Status, BTreeMap<String, Status>) {
        let timer = Timer::new();
        let seq = self.rounds.fetch_add(1, Ordering::Relaxed) + 1;
        let checks = self.registry.snapshot();
        let count = checks.len();

        let (status, details) = if checks.is_empty() {
            (Status::Healthy, BTreeMap::new())
        } else {
            let ctx = CheckContext::new(effective_deadline(deadline, self.timeout));
            let (tally, details) = if self.parallel.is_parallel(count) {
                run_parallel(ctx, checks).await
            } else {
                run_sequential(ctx, checks).await
            };
            (tally.status(), details)
        };

        if !self.publish(seq, status, &details) {
            debug!("Discarding result of superseded round {}", seq);
            return (status, details);
        }

        if let Some(metrics) = &self.metrics {
            for (name, s) in &details {
                metrics.record_check(name, *s);
            }
            metrics.record_evaluation(status, count, timer.elapsed());
        }

        debug!(
            "Health check round complete: {} ({} checks in {:?})",
            status,
            count,
            timer.elapsed()
        );
        (status, details)
    }

    fn publish(&self, seq: u64, status: Status, details: &BTreeMap<String, Status>) -> bool {
        // Held through notification so deliveries from overlapping rounds
        // never interleave.
        let mut published = self
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if seq < *published {
            return false;
        }
        *published = seq;

        self.snapshot.store(Arc::new(Snapshot {
            status,
            details: details.clone(),
            checked_at: Some(Utc::now()),
        }));

        let old = self.status.swap(status);
        if old != status {
            debug!("Aggregate health changed from {} to {}", old, status);
            if let Some(notifier) = &self.notifier {
                notifier.health_changed(status, old, details);
            }
        }
        true
    }
}

impl Default for Checker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Checker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checker")
            .field("registry", &self.registry)
            .field("timeout", &self.timeout)
            .field("parallel", &self.parallel)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Check for Checker {
    async fn check_health(&self, ctx: CheckContext) -> Status {
        self.evaluate(Some(ctx.deadline())).await.0
    }
}

/// Tighter of the caller's deadline and `now + timeout`.
pub fn effective_deadline(deadline: Option<Instant>, timeout: Duration) -> Instant {
    let own = Instant::now() + timeout;
    match deadline {
        Some(d) if d < own => d,
        _ => own,
    }
}

async fn run_check(name: &str, check: &dyn Check, ctx: CheckContext) -> Status {
    match timeout_at(ctx.deadline(), check.check_health(ctx)).await {
        Ok(status) => {
            debug!("Health for {} is {}", name, status);
            status
        }
        Err(_) => {
            warn!("Health check {} did not finish before the deadline", name);
            Status::Unknown
        }
    }
}

fn spawn_check(name: &str, check: Arc<dyn Check>, ctx: CheckContext) -> JoinHandle<Status> {
    let name = name.to_string();
    tokio::spawn(async move { run_check(&name, check.as_ref(), ctx).await })
}

/// Waits for a spawned check. A check that blocks without yielding never lets
/// its own timer fire, so the join is bounded by the same deadline and the
/// task aborted once it passes. A panicking check counts as unhealthy.
async fn join_check(name: &str, handle: JoinHandle<Status>, ctx: CheckContext) -> Status {
    let abort = handle.abort_handle();
    match timeout_at(ctx.deadline(), handle).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            error!("Health check {} failed: {}", name, e);
            Status::Unhealthy
        }
        Err(_) => {
            abort.abort();
            warn!("Health check {} did not respond before the deadline", name);
            Status::Unknown
        }
    }
}

async fn run_sequential(
    ctx: CheckContext,
    checks: Vec<(String, Arc<dyn Check>)>,
) -> (Tally, BTreeMap<String, Status>) {
    let mut tally = Tally::new();
    let mut details = BTreeMap::new();

    for (name, check) in checks {
        let handle = spawn_check(&name, check, ctx);
        let status = join_check(&name, handle, ctx).await;
        tally.push(status);
        details.insert(name, status);
    }

    (tally, details)
}

async fn run_parallel(
    ctx: CheckContext,
    checks: Vec<(String, Arc<dyn Check>)>,
) -> (Tally, BTreeMap<String, Status>) {
    let tasks: Vec<_> = checks
        .into_iter()
        .map(|(name, check)| {
            let handle = spawn_check(&name, check, ctx);
            (name, handle)
        })
        .collect();

    let joins = tasks.into_iter().map(|(name, handle)| async move {
        let status = join_check(&name, handle, ctx).await;
        (name, status)
    });
    let results = futures::future::join_all(joins).await;

    let mut tally = Tally::new();
    let mut details = BTreeMap::new();
    for (name, status) in results {
        tally.push(status);
        details.insert(name, status);
    }

    (tally, details)
}
