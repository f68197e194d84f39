use shared::metrics_defs::{MetricDef, MetricType};

pub const CALLS_STARTED: MetricDef = MetricDef {
    name: "grouping.calls.started",
    metric_type: MetricType::Counter,
    description: "Task leaves handed to the invoker",
};

pub const CALL_DURATION: MetricDef = MetricDef {
    name: "grouping.call.duration",
    metric_type: MetricType::Histogram,
    description: "Task leaf duration in seconds, including pool wait",
};

pub const GROUP_TIMEOUTS: MetricDef = MetricDef {
    name: "grouping.group.timeouts",
    metric_type: MetricType::Counter,
    description: "Groups that hit their deadline before all branches completed",
};

pub const ALL_METRICS: &[MetricDef] = &[CALLS_STARTED, CALL_DURATION, GROUP_TIMEOUTS];
