//! A single request/verify cycle against the target endpoint.
//!
//! Every cycle issues one GET through the shared client, drains the body and
//! compares it byte-for-byte with the expected payload. All failure kinds are
//! reported through [`VerificationError`]; the driver treats them alike.

use bytes::Bytes;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Uri};
use loopbench_common::ClientConfig;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

/// Client shared by every cycle. Clones share one connection pool.
pub type BenchClient = Client<HttpConnector, Body>;

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("error during GET: {0}")]
    Transport(#[source] hyper::Error),
    #[error("error reading response body: {0}")]
    Read(#[source] hyper::Error),
    #[error("got body {got:?}; want {want:?}")]
    Mismatch { got: Bytes, want: Bytes },
    #[error("request exceeded deadline of {0:?}")]
    Timeout(Duration),
    #[error("bench cancelled while request was in flight")]
    Cancelled,
}

/// Builds the long-lived client with an enlarged per-host idle pool.
pub fn build_client(config: &ClientConfig) -> BenchClient {
    Client::builder()
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .build_http()
}

pub async fn verify(
    client: &BenchClient,
    url: &Uri,
    expected: &Bytes,
) -> Result<(), VerificationError> {
    let res = client
        .get(url.clone())
        .await
        .map_err(VerificationError::Transport)?;

    let body = hyper::body::to_bytes(res.into_body())
        .await
        .map_err(VerificationError::Read)?;

    if body != *expected {
        return Err(VerificationError::Mismatch {
            got: body,
            want: expected.clone(),
        });
    }

    Ok(())
}

/// Runs [`verify`] under `deadline` so a hung request cannot hold its permit forever.
pub async fn verify_with_deadline(
    client: &BenchClient,
    url: &Uri,
    expected: &Bytes,
    deadline: Duration,
) -> Result<(), VerificationError> {
    match timeout(deadline, verify(client, url, expected)).await {
        Ok(res) => res,
        Err(_) => Err(VerificationError::Timeout(deadline)),
    }
}
