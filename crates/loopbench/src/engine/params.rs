use loopbench_common::DefaultsConfig;
use std::borrow::Cow;
use thiserror::Error;

/// Upper bound on `parallel` accepted from a trigger request.
pub const MAX_PARALLEL: i64 = 65_536;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("parallel/iterations have to be at least 1")]
    NotPositive,
    #[error("iterations have to be bigger than parallel")]
    NotBiggerThanParallel,
    #[error("parallel must not exceed {max}")]
    TooParallel { max: i64 },
}

/// A validated benchmark request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchParams {
    pub iterations: usize,
    pub parallel: u32,
}

impl BenchParams {
    /// Parses `iterations` and `parallel` from a raw query string and validates them.
    ///
    /// Each parameter falls back to its own default when absent or unparsable.
    pub fn from_query(query: Option<&str>, defaults: &DefaultsConfig) -> Result<Self, ParamError> {
        let query = query.unwrap_or("");
        let iterations = parse_or(query_value(query, "iterations"), defaults.iterations);
        let parallel = parse_or(query_value(query, "parallel"), defaults.parallel);
        Self::validate(iterations, parallel)
    }

    pub fn validate(iterations: i64, parallel: i64) -> Result<Self, ParamError> {
        if iterations < 1 || parallel < 1 {
            return Err(ParamError::NotPositive);
        }
        if iterations <= parallel {
            return Err(ParamError::NotBiggerThanParallel);
        }
        if parallel > MAX_PARALLEL {
            return Err(ParamError::TooParallel { max: MAX_PARALLEL });
        }

        let iterations = usize::try_from(iterations).map_err(|_| ParamError::NotPositive)?;
        let parallel = u32::try_from(parallel).map_err(|_| ParamError::NotPositive)?;
        Ok(Self {
            iterations,
            parallel,
        })
    }
}

/// First percent-decoded value for `key` in a urlencoded query string.
fn query_value<'a>(query: &'a str, key: &str) -> Option<Cow<'a, str>> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v)
}

fn parse_or(raw: Option<Cow<'_, str>>, default: i64) -> i64 {
    raw.and_then(|v| v.parse().ok()).unwrap_or(default)
}
