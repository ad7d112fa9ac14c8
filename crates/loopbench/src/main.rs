use bytes::Bytes;
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use loopbench::engine::driver::BenchContext;
use loopbench::engine::target::{FaultPlan, TargetEndpoint};
use loopbench::engine::trigger::{spawn_trigger_server, TriggerState};
use loopbench::engine::verify::build_client;
use loopbench::error::HarnessError;
use loopbench::metrics;
use loopbench_common::Config;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const CONFIG_ENV: &str = "LOOPBENCH_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/loopbench.yaml";

fn init_production_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_target(true))
        .init();

    info!("Structured logging initialized (JSON)");
}

async fn run_metrics_server(port: u16, shutdown: CancellationToken) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    metrics::register_metrics();

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, Infallible>(service_fn(metrics::observability_handler))
    });

    let server = match Server::try_bind(&addr) {
        Ok(builder) => builder.serve(make_svc),
        Err(e) => {
            error!(port = port, error = %e, "Observability server failed to bind");
            return;
        }
    };

    info!(port = port, "Observability server online");

    let graceful = server.with_graceful_shutdown(async move { shutdown.cancelled().await });
    if let Err(e) = graceful.await {
        error!(error = %e, "Observability server failed");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_production_logging();

    let config_path =
        std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut config = Config::load(&config_path)?;
    config.apply_env(|key| std::env::var(key).ok())?;
    info!(config_path = %config_path, port = config.server.port, "Configuration loaded");

    let master_token = CancellationToken::new();

    let metrics_task = if config.metrics.enabled {
        let port = config.metrics.port;
        let token = master_token.clone();
        Some(tokio::spawn(async move {
            run_metrics_server(port, token).await;
        }))
    } else {
        None
    };

    let payload = Bytes::from(config.target.payload.clone().into_bytes());
    let target = TargetEndpoint::start(payload.clone(), FaultPlan::default())?;

    let ctx = BenchContext::new(
        build_client(&config.client),
        target.url().clone(),
        payload,
        config.client.request_timeout(),
    );
    let state = Arc::new(TriggerState {
        ctx,
        defaults: config.defaults.clone(),
        shutdown: master_token.clone(),
    });

    let listen_address = config.server.listen_address();
    let addr: SocketAddr = listen_address
        .parse()
        .map_err(|_| HarnessError::InvalidAddress(listen_address.clone()))?;
    let (bound, mut server) = spawn_trigger_server(addr, state)?;
    info!(listen_addr = %bound, target_url = %target.url(), "Loopbench started");

    let signalled = tokio::select! {
        _ = &mut server => false,
        _ = tokio::signal::ctrl_c() => true,
    };

    master_token.cancel();
    if signalled {
        info!("Shutdown signal received");
        let _ = server.await;
    } else {
        error!("Trigger server exited unexpectedly");
    }

    if let Some(task) = metrics_task {
        let _ = task.await;
    }
    target.shutdown().await;

    Ok(())
}
