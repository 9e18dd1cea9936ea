//! Telemetry
//!
//! Flow metrics. Log events go through `tracing` directly.

pub mod metrics;

pub use metrics::{
    no_op_metrics, InMemoryMetrics, MetricEntry, MetricLabels, MtdMetrics, NoOpMetrics,
};
