// src/health/check.rs
use super::Status;
use async_trait::async_trait;
use std::future::Future;
use tokio::time::{Duration, Instant};

/// Execution context handed to every [`Check`] of an evaluation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckContext {
    deadline: Instant,
}

impl CheckContext {
    pub fn new(deadline: Instant) -> Self {
        Self { deadline }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(Instant::now() + timeout)
    }

    /// Instant after which the result of the check is discarded.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// A named unit of work that reports a [`Status`].
///
/// Returning [`Status::Unknown`] is the way to signal that the verdict could
/// not be determined. Implementations should respect the deadline of the
/// context; checks that run past it are dropped and count as unknown.
#[async_trait]
pub trait Check: Send + Sync {
    async fn check_health(&self, ctx: CheckContext) -> Status;
}

/// Adapts an async closure into a [`Check`].
pub struct CheckFn<F> {
    f: F,
}

pub fn check_fn<F, Fut>(f: F) -> CheckFn<F>
where
    F: Fn(CheckContext) -> Fut + Send + Sync,
    Fut: Future<Output = Status> + Send + 'static,
{
    CheckFn { f }
}

#[async_trait]
impl<F, Fut> Check for CheckFn<F>
where
    F: Fn(CheckContext) -> Fut + Send + Sync,
    Fut: Future<Output = Status> + Send + 'static,
{
    async fn check_health(&self, ctx: CheckContext) -> Status {
        (self.f)(ctx).await
    }
}

/// A check that always reports the same status.
#[derive(Debug, Clone, Copy)]
pub struct StaticCheck(pub Status);

#[async_trait]
impl Check for StaticCheck {
    async fn check_health(&self, _ctx: CheckContext) -> Status {
        self.0
    }
}
