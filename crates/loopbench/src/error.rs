use hyper::http::uri::InvalidUri;
use thiserror::Error;

/// Errors raised while bringing up the harness servers.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: hyper::Error,
    },
    #[error("invalid listen address {0:?}")]
    InvalidAddress(String),
    #[error("invalid target url: {0}")]
    InvalidUrl(#[from] InvalidUri),
}
