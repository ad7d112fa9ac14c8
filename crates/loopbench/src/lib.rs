pub mod engine;
pub mod error;
pub mod metrics;

pub use engine::driver::{run_bench, BenchContext, BenchResult, IN_FLIGHT};
pub use engine::params::{BenchParams, ParamError};
pub use engine::target::{FaultPlan, TargetEndpoint};
pub use engine::verify::{build_client, verify, BenchClient, VerificationError};
pub use error::HarnessError;
