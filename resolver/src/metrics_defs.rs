//! Metrics definitions for the resolver.

use shared::metrics_defs::{MetricDef, MetricType};

pub const UPSTREAM_REQUEST_DURATION: MetricDef = MetricDef {
    name: "upstream.request.duration",
    metric_type: MetricType::Histogram,
    description: "Time spent on a groups API call in seconds. Tagged with operation.",
};

pub const ROLE_PAGES_FETCHED: MetricDef = MetricDef {
    name: "upstream.role_pages",
    metric_type: MetricType::Histogram,
    description: "Number of role pages walked to resolve a single rank",
};

pub const RANK_UPDATES: MetricDef = MetricDef {
    name: "rank.update",
    metric_type: MetricType::Counter,
    description: "Number of membership update calls. Tagged with result.",
};

pub const ALL_METRICS: &[MetricDef] = &[UPSTREAM_REQUEST_DURATION, ROLE_PAGES_FETCHED, RANK_UPDATES];
