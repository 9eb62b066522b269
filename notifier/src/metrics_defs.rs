//! Metrics definitions for webhook delivery.

use shared::metrics_defs::{MetricDef, MetricType};

pub const DELIVERY_ATTEMPT: MetricDef = MetricDef {
    name: "notifier.attempt",
    metric_type: MetricType::Counter,
    description: "Number of webhook delivery attempts. Tagged with result.",
};

pub const DELIVERY_EXHAUSTED: MetricDef = MetricDef {
    name: "notifier.exhausted",
    metric_type: MetricType::Counter,
    description: "Number of notifications dropped after exhausting all attempts",
};

pub const ALL_METRICS: &[MetricDef] = &[DELIVERY_ATTEMPT, DELIVERY_EXHAUSTED];
