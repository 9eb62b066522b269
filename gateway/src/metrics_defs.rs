//! Metrics definitions for the HTTP gateway.

use shared::metrics_defs::{MetricDef, MetricType};

pub const AUTH_REJECTED: MetricDef = MetricDef {
    name: "gateway.auth.rejected",
    metric_type: MetricType::Counter,
    description: "Requests rejected for a missing or wrong key. Tagged with scope.",
};

pub const RATE_LIMITED: MetricDef = MetricDef {
    name: "gateway.rate_limited",
    metric_type: MetricType::Counter,
    description: "Requests rejected by the global rate limiter",
};

pub const RANK_CHANGE_DURATION: MetricDef = MetricDef {
    name: "gateway.rank_change.duration",
    metric_type: MetricType::Histogram,
    description: "Time spent resolving and applying a rank change, in seconds. Tagged with result.",
};

pub const PROXY_REQUESTS: MetricDef = MetricDef {
    name: "gateway.proxy.requests",
    metric_type: MetricType::Counter,
    description: "Webhook proxy requests. Tagged with system and result.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    AUTH_REJECTED,
    RATE_LIMITED,
    RANK_CHANGE_DURATION,
    PROXY_REQUESTS,
];
