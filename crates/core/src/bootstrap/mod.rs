//! Bootstrap engine.
//!
//! Generic percentile bootstrap over row resamples, parameterised by a
//! scoring closure, plus the VPC interval built on it.

mod config;
mod engine;
mod vpc;

pub use config::BootstrapConfig;
pub use engine::{
    bootstrap_ci, bootstrap_ci_with_rng, quantile, resample_indices, BootstrapInterval,
};
pub use vpc::bootstrap_vpc;
