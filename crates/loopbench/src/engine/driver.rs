//! Bounded-concurrency benchmark driver.
//!
//! The submission loop takes one semaphore permit per iteration before
//! spawning the cycle, so at most `parallel` cycles are ever in flight. Once
//! every iteration is submitted the driver takes back all `parallel` permits,
//! which only succeeds after the last cycle has finished. Timing is taken
//! after that drain.

use crate::engine::verify::{verify_with_deadline, BenchClient, VerificationError};
use crate::metrics;
use bytes::Bytes;
use hyper::Uri;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Cycles in flight across every run in the process.
pub static IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);

/// Everything a cycle needs. Built once at startup and shared read-only.
#[derive(Clone)]
pub struct BenchContext {
    pub client: BenchClient,
    pub url: Uri,
    pub payload: Bytes,
    pub request_timeout: Duration,
}

impl BenchContext {
    pub fn new(client: BenchClient, url: Uri, payload: Bytes, request_timeout: Duration) -> Self {
        Self {
            client,
            url,
            payload,
            request_timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchResult {
    pub elapsed: Duration,
    pub iterations: usize,
    pub per_op: Duration,
    pub succeeded: usize,
    pub failed: usize,
    pub peak_in_flight: usize,
    pub cancelled: bool,
}

impl BenchResult {
    fn new(elapsed: Duration, iterations: usize, tally: &Tally, cancelled: bool) -> Self {
        // Zero iterations has no meaningful per-op figure; report zero rather than divide.
        let per_op = if iterations == 0 {
            Duration::ZERO
        } else {
            let nanos = elapsed.as_nanos() / iterations as u128;
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
        };

        Self {
            elapsed,
            iterations,
            per_op,
            succeeded: tally.succeeded.load(Ordering::SeqCst),
            failed: tally.failed.load(Ordering::SeqCst),
            peak_in_flight: tally.peak.load(Ordering::SeqCst),
            cancelled,
        }
    }

    /// Cycles that reached a terminal state, successful or not.
    pub fn completed(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// `bench took: <elapsed>, <n> ns/op`, with elapsed rendered as e.g. `347.349µs` or `1m40s`.
impl fmt::Display for BenchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bench took: {}, {} ns/op",
            format_elapsed(self.elapsed),
            self.per_op.as_nanos()
        )
    }
}

/// Sub-minute durations keep `Duration`'s debug form; longer ones are split
/// into hours and minutes with fractional seconds last.
fn format_elapsed(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }
    if d < Duration::from_secs(60) {
        return format!("{:?}", d);
    }

    let total = d.as_secs();
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    out.push_str(&format!("{}m{}", minutes, secs));

    let nanos = d.subsec_nanos();
    if nanos > 0 {
        let frac = format!("{:09}", nanos);
        out.push('.');
        out.push_str(frac.trim_end_matches('0'));
    }
    out.push('s');
    out
}

/// Per-run counters. Never shared between runs.
#[derive(Default)]
struct Tally {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    current: AtomicUsize,
    peak: AtomicUsize,
}

/// Held by a cycle for as long as it runs. Taken after the permit and dropped before it.
struct InFlightGuard {
    tally: Arc<Tally>,
}

impl InFlightGuard {
    fn new(tally: Arc<Tally>) -> Self {
        let now = tally.current.fetch_add(1, Ordering::SeqCst) + 1;
        tally.peak.fetch_max(now, Ordering::SeqCst);
        IN_FLIGHT.fetch_add(1, Ordering::SeqCst);
        Self { tally }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.tally.current.fetch_sub(1, Ordering::SeqCst);
        IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Runs `iterations` request/verify cycles with at most `parallel` in flight.
///
/// The caller validates `iterations > parallel > 0`. Failed cycles are logged
/// and counted but never abort the run. Cancelling `cancel` stops submission
/// and ends in-flight cycles; the result still reflects everything that ran.
pub async fn run_bench(
    ctx: &BenchContext,
    iterations: usize,
    parallel: u32,
    cancel: &CancellationToken,
) -> BenchResult {
    let before = Instant::now();
    metrics::RUNS.inc();

    let semaphore = Arc::new(Semaphore::new(parallel as usize));
    let tally = Arc::new(Tally::default());
    let mut cancelled = false;

    for i in 0..iterations {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(submitted = i, iterations, "Bench cancelled, stopping submission");
                cancelled = true;
                break;
            }
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };

        let guard = InFlightGuard::new(Arc::clone(&tally));
        let ctx = ctx.clone();
        let tally = Arc::clone(&tally);
        let cancel = cancel.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let _guard = guard;

            let outcome = tokio::select! {
                res = verify_with_deadline(&ctx.client, &ctx.url, &ctx.payload, ctx.request_timeout) => res,
                _ = cancel.cancelled() => Err(VerificationError::Cancelled),
            };

            match outcome {
                Ok(()) => {
                    tally.succeeded.fetch_add(1, Ordering::SeqCst);
                    metrics::CYCLES_SUCCEEDED.inc();
                }
                Err(e) => {
                    tally.failed.fetch_add(1, Ordering::SeqCst);
                    metrics::CYCLES_FAILED.inc();
                    warn!(iteration = i, error = %e, "error during bench");
                }
            }
        });
    }

    // Completion barrier: every permit comes back only once every cycle has ended.
    match semaphore.acquire_many(parallel).await {
        Ok(_drained) => debug!(parallel, "All bench cycles drained"),
        Err(e) => warn!(error = %e, "Permit pool closed before drain"),
    }

    BenchResult::new(before.elapsed(), iterations, &tally, cancelled)
}
