use hyper::{Body, Request, StatusCode};
use loopbench::metrics::{observability_handler, register_metrics, render_metrics};

async fn call(path: &str) -> (StatusCode, String) {
    let req = Request::builder().uri(path).body(Body::empty()).unwrap();
    let res = observability_handler(req).await.unwrap();
    let status = res.status();
    let body = hyper::body::to_bytes(res.into_body()).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn health_reports_ok() {
    let (status, body) = call("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn metrics_exposes_bench_counters() {
    register_metrics();
    let (status, body) = call("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    for name in [
        "loopbench_runs_total",
        "loopbench_cycles_succeeded_total",
        "loopbench_cycles_failed_total",
        "loopbench_rejected_triggers_total",
        "loopbench_in_flight",
    ] {
        assert!(body.contains(name), "missing {} in {}", name, body);
    }
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let (status, body) = call("/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "Not Found");
}

#[test]
fn registering_twice_is_harmless() {
    register_metrics();
    register_metrics();
    assert!(render_metrics().contains("loopbench_in_flight"));
}
