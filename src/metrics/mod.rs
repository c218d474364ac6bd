mod collector;

pub use collector::{HealthMetrics, MetricsRegistry, Timer};
