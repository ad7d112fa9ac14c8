//! Trigger endpoint: parses a benchmark request, runs the driver and streams
//! the outcome back as two lines of plain text.

use crate::engine::driver::{run_bench, BenchContext};
use crate::engine::params::BenchParams;
use crate::error::HarnessError;
use crate::metrics;
use bytes::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use loopbench_common::DefaultsConfig;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Shared by every trigger request. Holds no per-run state.
pub struct TriggerState {
    pub ctx: BenchContext,
    pub defaults: DefaultsConfig,
    pub shutdown: CancellationToken,
}

fn plain_text(status: StatusCode, msg: &str) -> Response<Body> {
    let mut res = Response::new(Body::from(format!("{}\n", msg)));
    *res.status_mut() = status;
    res.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    res
}

pub async fn handle_trigger(
    req: Request<Body>,
    state: Arc<TriggerState>,
) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::GET {
        return Ok(plain_text(
            StatusCode::METHOD_NOT_ALLOWED,
            "only GET is supported",
        ));
    }

    let params = match BenchParams::from_query(req.uri().query(), &state.defaults) {
        Ok(p) => p,
        Err(e) => {
            metrics::REJECTED_TRIGGERS.inc();
            warn!(query = req.uri().query().unwrap_or(""), reason = %e, "Rejected bench request");
            return Ok(plain_text(StatusCode::BAD_REQUEST, &e.to_string()));
        }
    };

    let start_msg = format!(
        "running bench with {} iterations and {} in parallel",
        params.iterations, params.parallel
    );
    info!(
        iterations = params.iterations,
        parallel = params.parallel,
        "{}",
        start_msg
    );

    let (mut sender, body) = Body::channel();
    tokio::spawn(async move {
        if sender
            .send_data(Bytes::from(format!("{}\n", start_msg)))
            .await
            .is_err()
        {
            debug!("Trigger client went away before the bench started");
        }

        let res = run_bench(
            &state.ctx,
            params.iterations,
            params.parallel,
            &state.shutdown,
        )
        .await;

        info!(
            succeeded = res.succeeded,
            failed = res.failed,
            peak_in_flight = res.peak_in_flight,
            cancelled = res.cancelled,
            "{}",
            res
        );

        if sender
            .send_data(Bytes::from(format!("{}\n", res)))
            .await
            .is_err()
        {
            debug!("Trigger client went away before the result was ready");
        }
    });

    let mut res = Response::new(body);
    res.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    Ok(res)
}

/// Binds the trigger server and serves it until `state.shutdown` is cancelled.
///
/// Returns the bound address, which differs from `addr` when port 0 was requested.
pub fn spawn_trigger_server(
    addr: SocketAddr,
    state: Arc<TriggerState>,
) -> Result<(SocketAddr, JoinHandle<()>), HarnessError> {
    let svc_state = Arc::clone(&state);
    let make_svc = make_service_fn(move |_conn| {
        let state = Arc::clone(&svc_state);
        async move {
            Ok::<_, Infallible>(service_fn(move |req| handle_trigger(req, Arc::clone(&state))))
        }
    });

    let builder = Server::try_bind(&addr).map_err(|source| HarnessError::Bind {
        addr: addr.to_string(),
        source,
    })?;
    let server = builder.serve(make_svc);
    let local_addr = server.local_addr();

    let token = state.shutdown.clone();
    let handle = tokio::spawn(async move {
        let graceful = server.with_graceful_shutdown(async move { token.cancelled().await });
        if let Err(e) = graceful.await {
            error!(error = %e, "Trigger server failed");
        }
    });

    info!(listen_addr = %local_addr, "Trigger server online");
    Ok((local_addr, handle))
}
