//! Loopback endpoint the driver benchmarks against.
//!
//! Answers every request, whatever its method or path, with the fixed payload
//! and `200 OK`. It doubles as the oracle for body verification.

use crate::error::HarnessError;
use bytes::Bytes;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, Uri};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Faults injected into responses. The default plan injects none.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Every k-th request (1-based) gets a corrupted body.
    pub corrupt_every: Option<usize>,
    /// Sleep before answering each request.
    pub delay: Option<Duration>,
}

struct Responder {
    payload: Bytes,
    faults: FaultPlan,
    hits: AtomicUsize,
}

impl Responder {
    async fn respond(&self) -> Response<Body> {
        let hit = self.hits.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(delay) = self.faults.delay {
            tokio::time::sleep(delay).await;
        }

        match self.faults.corrupt_every {
            Some(k) if k > 0 && hit % k == 0 => Response::new(Body::from(corrupt(&self.payload))),
            _ => Response::new(Body::from(self.payload.clone())),
        }
    }
}

fn corrupt(payload: &Bytes) -> Bytes {
    let mut body = payload.to_vec();
    match body.first_mut() {
        Some(b) => *b ^= 0xFF,
        None => body.push(0),
    }
    Bytes::from(body)
}

pub struct TargetEndpoint {
    addr: SocketAddr,
    url: Uri,
    responder: Arc<Responder>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl TargetEndpoint {
    /// Binds an ephemeral loopback port and starts serving. Must be called inside a tokio runtime.
    pub fn start(payload: Bytes, faults: FaultPlan) -> Result<Self, HarnessError> {
        let bind_addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let responder = Arc::new(Responder {
            payload,
            faults,
            hits: AtomicUsize::new(0),
        });

        let svc_responder = Arc::clone(&responder);
        let make_svc = make_service_fn(move |_conn| {
            let responder = Arc::clone(&svc_responder);
            async move {
                Ok::<_, Infallible>(service_fn(move |_req: Request<Body>| {
                    let responder = Arc::clone(&responder);
                    async move { Ok::<_, Infallible>(responder.respond().await) }
                }))
            }
        });

        let builder = Server::try_bind(&bind_addr).map_err(|source| HarnessError::Bind {
            addr: bind_addr.to_string(),
            source,
        })?;
        let server = builder.serve(make_svc);
        let addr = server.local_addr();
        let url: Uri = format!("http://{}/", addr).parse()?;

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let task = tokio::spawn(async move {
            let graceful = server.with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = graceful.await {
                error!(error = %e, "Target endpoint failed");
            }
        });

        info!(target_addr = %addr, "Target endpoint online");

        Ok(Self {
            addr,
            url,
            responder,
            shutdown,
            task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> &Uri {
        &self.url
    }

    /// Requests served so far.
    pub fn hits(&self) -> usize {
        self.responder.hits.load(Ordering::SeqCst)
    }

    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = self.task.await;
        info!(target_addr = %self.addr, "Target endpoint stopped");
    }
}
