//! Metric name constants and recording helpers
//!
//! Instruments are created lazily from the global meter, so recording before
//! [`crate::init`] (or in tests) goes to the no-op provider.

use std::sync::OnceLock;
use std::time::Instant;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter};

pub const TURN_DURATION: &str = "router.turn.duration";
pub const TURN_COUNT: &str = "router.turn.count";
pub const DISCOVERY_COUNT: &str = "router.discovery.count";
pub const CACHE_EVICTION_COUNT: &str = "router.cache.eviction.count";
pub const TOOL_CALL_COUNT: &str = "router.tool_call.count";
pub const SEARCH_DURATION: &str = "router.search.duration";

/// Router instruments
pub struct RouterMetrics {
    turn_duration: Histogram<f64>,
    turn_count: Counter<u64>,
    discovery_count: Counter<u64>,
    eviction_count: Counter<u64>,
    tool_call_count: Counter<u64>,
    search_duration: Histogram<f64>,
}

impl RouterMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            turn_duration: meter
                .f64_histogram(TURN_DURATION)
                .with_unit("s")
                .with_description("Wall time of a conversation turn")
                .build(),
            turn_count: meter.u64_counter(TURN_COUNT).build(),
            discovery_count: meter
                .u64_counter(DISCOVERY_COUNT)
                .with_description("Discovery rounds requested by the agent")
                .build(),
            eviction_count: meter.u64_counter(CACHE_EVICTION_COUNT).build(),
            tool_call_count: meter.u64_counter(TOOL_CALL_COUNT).build(),
            search_duration: meter.f64_histogram(SEARCH_DURATION).with_unit("s").build(),
        }
    }
}

fn router_metrics() -> &'static RouterMetrics {
    static METRICS: OnceLock<RouterMetrics> = OnceLock::new();
    METRICS.get_or_init(|| RouterMetrics::new(&global::meter("waypoint")))
}

/// Record a duration measurement on a histogram
pub fn record_duration(histogram: &Histogram<f64>, start: Instant, attributes: &[KeyValue]) {
    histogram.record(start.elapsed().as_secs_f64(), attributes);
}

/// Record a finished turn
pub fn record_turn(start: Instant, success: bool) {
    let metrics = router_metrics();
    let attrs = [KeyValue::new("success", success)];
    record_duration(&metrics.turn_duration, start, &attrs);
    metrics.turn_count.add(1, &attrs);
}

/// Record one discovery round
pub fn record_discovery(matched: usize) {
    router_metrics()
        .discovery_count
        .add(1, &[KeyValue::new("matched", matched > 0)]);
}

/// Record servers evicted from a conversation cache
pub fn record_evictions(count: usize) {
    if count > 0 {
        router_metrics().eviction_count.add(count as u64, &[]);
    }
}

/// Record a tool invocation outcome
pub fn record_tool_call(server: &str, success: bool) {
    router_metrics().tool_call_count.add(
        1,
        &[
            KeyValue::new("server", server.to_owned()),
            KeyValue::new("success", success),
        ],
    );
}

/// Record a registry search
pub fn record_search(start: Instant) {
    record_duration(&router_metrics().search_duration, start, &[]);
}
