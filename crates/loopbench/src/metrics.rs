use crate::engine::driver::IN_FLIGHT;
use hyper::{Body, Request, Response, StatusCode};
use lazy_static::lazy_static;
use prometheus::{Encoder, Gauge, IntCounter, Registry, TextEncoder};
use std::convert::Infallible;
use std::sync::atomic::Ordering;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref IN_FLIGHT_GAUGE: Gauge = Gauge::new(
        "loopbench_in_flight",
        "Number of request/verify cycles currently in flight"
    )
    .expect("metric can be created");
    pub static ref RUNS: IntCounter = IntCounter::new(
        "loopbench_runs_total",
        "Total number of benchmark runs executed"
    )
    .expect("metric can be created");
    pub static ref CYCLES_SUCCEEDED: IntCounter = IntCounter::new(
        "loopbench_cycles_succeeded_total",
        "Total number of request/verify cycles whose body matched the expected payload"
    )
    .expect("metric can be created");
    /// Transport, read, mismatch, timeout and cancellation failures alike.
    pub static ref CYCLES_FAILED: IntCounter = IntCounter::new(
        "loopbench_cycles_failed_total",
        "Total number of request/verify cycles that failed"
    )
    .expect("metric can be created");
    pub static ref REJECTED_TRIGGERS: IntCounter = IntCounter::new(
        "loopbench_rejected_triggers_total",
        "Total number of trigger requests rejected by parameter validation"
    )
    .expect("metric can be created");
}

pub fn register_metrics() {
    let _ = REGISTRY.register(Box::new(IN_FLIGHT_GAUGE.clone()));
    let _ = REGISTRY.register(Box::new(RUNS.clone()));
    let _ = REGISTRY.register(Box::new(CYCLES_SUCCEEDED.clone()));
    let _ = REGISTRY.register(Box::new(CYCLES_FAILED.clone()));
    let _ = REGISTRY.register(Box::new(REJECTED_TRIGGERS.clone()));
}

fn update_metrics() {
    let count = IN_FLIGHT.load(Ordering::SeqCst) as f64;
    IN_FLIGHT_GAUGE.set(count);
}

pub fn render_metrics() -> String {
    update_metrics();

    let metric_families = REGISTRY.gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}", e);
    }

    String::from_utf8(buffer).unwrap_or_else(|_| "# Error: Invalid UTF8".to_string())
}

/// Routes for the observability server: `/health` and `/metrics`.
pub async fn observability_handler(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    match req.uri().path() {
        "/health" => Ok(Response::new(Body::from("OK"))),
        "/metrics" => Ok(Response::new(Body::from(render_metrics()))),
        _ => {
            let mut not_found = Response::new(Body::from("Not Found"));
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            Ok(not_found)
        }
    }
}
