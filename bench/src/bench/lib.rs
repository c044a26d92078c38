pub mod http_util;

use bench_executor::{BenchConfig, Benchmarker};
use lazy_static::lazy_static;

pub use bench_metrics::METRICS_FACTORY;

lazy_static! {
    /// Process wide engine, configured from the environment
    pub static ref BENCHMARKER: Benchmarker =
        Benchmarker::new(BenchConfig::from_env(), &METRICS_FACTORY);
}
