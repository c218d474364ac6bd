// src/metrics/collector.rs
use crate::health::Status;
use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<HealthMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(HealthMetrics::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<HealthMetrics> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

pub struct HealthMetrics {
    pub health_status: IntGauge,
    pub health_check_status: IntGaugeVec,
    pub health_evaluations_total: IntCounterVec,
    pub health_evaluation_duration_seconds: Histogram,
    pub health_checks_registered: IntGauge,
}

impl HealthMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let health_status = IntGauge::new(
            "health_status",
            "Aggregate health status (1=healthy, 0=unknown, -1=unhealthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let health_check_status = IntGaugeVec::new(
            Opts::new(
                "health_check_status",
                "Health status per check (1=healthy, 0=unknown, -1=unhealthy)",
            ),
            &["check"],
        )?;
        registry.register(Box::new(health_check_status.clone()))?;

        let health_evaluations_total = IntCounterVec::new(
            Opts::new(
                "health_evaluations_total",
                "Total evaluation rounds by aggregate status",
            ),
            &["status"],
        )?;
        registry.register(Box::new(health_evaluations_total.clone()))?;

        let health_evaluation_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "health_evaluation_duration_seconds",
            "Evaluation round duration in seconds",
        ))?;
        registry.register(Box::new(health_evaluation_duration_seconds.clone()))?;

        let health_checks_registered =
            IntGauge::new("health_checks_registered", "Number of registered checks")?;
        registry.register(Box::new(health_checks_registered.clone()))?;

        Ok(Self {
            health_status,
            health_check_status,
            health_evaluations_total,
            health_evaluation_duration_seconds,
            health_checks_registered,
        })
    }

    pub fn record_check(&self, check: &str, status: Status) {
        self.health_check_status
            .with_label_values(&[check])
            .set(status.repr() as i64);
    }

    pub fn record_evaluation(&self, status: Status, checks: usize, duration: std::time::Duration) {
        self.health_status.set(status.repr() as i64);
        self.health_checks_registered.set(checks as i64);
        self.health_evaluations_total
            .with_label_values(&[status.as_str()])
            .inc();
        self.health_evaluation_duration_seconds
            .observe(duration.as_secs_f64());
    }

    pub fn remove_check(&self, check: &str) {
        let _ = self.health_check_status.remove_label_values(&[check]);
    }
}

// Helper for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_contains_health_metrics() {
        let registry = MetricsRegistry::new().unwrap();
        let metrics = registry.collector();
        metrics.record_check("db", Status::Unhealthy);
        metrics.record_evaluation(Status::Unhealthy, 1, std::time::Duration::from_millis(5));

        let text = String::from_utf8(registry.gather().unwrap()).unwrap();
        assert!(text.contains("health_status -1"));
        assert!(text.contains("health_check_status{check=\"db\"} -1"));
        assert!(text.contains("health_evaluations_total{status=\"unhealthy\"} 1"));
    }
}
