use crate::error::Result;
use crate::fit::FittedModel;
use crate::variance::vpc;

use super::config::BootstrapConfig;
use super::engine::{bootstrap_ci, BootstrapInterval};

/// Bootstrap confidence interval for the VPC of `model`.
///
/// Every replicate resamples the rows of the model's data, refits the same
/// formula, family and backend, and recomputes the VPC.
pub fn bootstrap_vpc(model: &FittedModel, config: &BootstrapConfig) -> Result<BootstrapInterval> {
    let data = model.data();
    let score = |indices: &[usize]| -> Result<f64> {
        let refit = model.refit(data.take_rows(indices)?)?;
        vpc(&refit)
    };
    bootstrap_ci(score, data.nrows(), config)
}
