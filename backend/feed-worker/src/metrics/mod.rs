//! Fan-Out Metrics
//!
//! Prometheus metrics for the feed fan-out pipeline

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge, Encoder, Histogram,
    IntCounterVec, IntGauge, TextEncoder,
};
use std::time::Duration;

static EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_fanout_events_total",
        "Post events handled, by outcome (ack/nack_requeue/nack_discard)",
        &["outcome"]
    )
    .expect("Failed to register fan-out events metric")
});

static FEED_WRITES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_fanout_writes_total",
        "Per-follower feed writes (delivered/duplicate_skipped/push_failed/trim_failed)",
        &["result"]
    )
    .expect("Failed to register fan-out writes metric")
});

static RESOLVER_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_fanout_resolver_requests_total",
        "Follower lookups (success/transient_error/permanent_error)",
        &["result"]
    )
    .expect("Failed to register resolver requests metric")
});

static FANOUT_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "feed_fanout_duration_seconds",
        "Duration of one delivery attempt from decode to decision",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 3.0, 10.0]
    )
    .expect("Failed to register fan-out duration metric")
});

static FOLLOWERS_PER_EVENT: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "feed_fanout_followers_per_event",
        "Followers resolved per post event",
        vec![0.0, 1.0, 10.0, 100.0, 1_000.0, 10_000.0, 100_000.0]
    )
    .expect("Failed to register followers per event metric")
});

static INFLIGHT_DELIVERIES: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "feed_fanout_inflight_deliveries",
        "Deliveries currently being handled"
    )
    .expect("Failed to register inflight deliveries metric")
});

static DEAD_LETTERED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_fanout_dead_lettered_total",
        "Deliveries routed to the dead-letter queue, by failure cause",
        &["cause"]
    )
    .expect("Failed to register dead-lettered metric")
});

pub fn record_outcome(outcome: &str) {
    EVENTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_feed_write(result: &str) {
    FEED_WRITES_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_resolver_request(result: &str) {
    RESOLVER_REQUESTS_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_fanout_duration(duration: Duration) {
    FANOUT_DURATION_SECONDS.observe(duration.as_secs_f64());
}

pub fn record_followers(count: usize) {
    FOLLOWERS_PER_EVENT.observe(count as f64);
}

/// Handle on the in-flight gauge; clones share the registered value.
pub fn inflight_deliveries() -> IntGauge {
    INFLIGHT_DELIVERIES.clone()
}

pub fn record_dead_lettered(cause: &str) {
    DEAD_LETTERED_TOTAL.with_label_values(&[cause]).inc();
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
