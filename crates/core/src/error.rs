use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MaihdaError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Column '{0}' not found in DataFrame")]
    ColumnNotFound(String),

    #[error("Stratum variables not found in data: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Dimension mismatch: expected {expected}, got {got} in {context}")]
    DimensionMismatch {
        expected: usize,
        got: usize,
        context: String,
    },

    #[error("Unsupported family '{0}' (expected one of: gaussian, binomial, poisson)")]
    UnsupportedFamily(String),

    #[error("Unsupported engine: {0}")]
    UnsupportedEngine(String),

    #[error("Formula error: {0}")]
    Formula(String),

    #[error("Matrix is not positive definite")]
    NotPositiveDefinite,

    #[error("Could not extract variance components: {0}")]
    Extraction(String),

    #[error("Models were fit with different engines ({first} vs {second})")]
    EngineMismatch { first: String, second: String },

    #[error("Between-stratum variance of {model} is not a finite number ({value})")]
    InvalidVariance { model: String, value: f64 },

    #[error("Between-stratum variance of the reference model is {0}; PVC is undefined unless it is positive")]
    NonPositiveVariance(f64),

    #[error("All {n_boot} bootstrap replicates failed; no confidence interval could be computed")]
    BootstrapFailed { n_boot: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, MaihdaError>;

/// Conditions that are reported to the caller but do not stop the analysis.
///
/// Every warning is logged through `log::warn!` where it is raised and also
/// carried on the result record that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MaihdaWarning {
    /// Fewer than half of the bootstrap replicates produced a statistic.
    BootstrapUnreliable { succeeded: usize, requested: usize },
    /// Two compared models were fit on data sets with different row counts.
    SizeMismatch { first: usize, second: usize },
    /// The fitter stopped at its iteration limit.
    NotConverged { iterations: usize, change: f64 },
    /// The between-stratum variance collapsed onto the boundary of the
    /// parameter space.
    SingularFit { group: String },
}

impl MaihdaWarning {
    /// Log the warning and hand it back, for use at the point of detection.
    pub(crate) fn emit(self) -> Self {
        log::warn!("{}", self);
        self
    }
}

impl fmt::Display for MaihdaWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaihdaWarning::BootstrapUnreliable {
                succeeded,
                requested,
            } => write!(
                f,
                "only {}/{} bootstrap replicates succeeded ({:.1}%); interval may be unreliable",
                succeeded,
                requested,
                100.0 * *succeeded as f64 / (*requested).max(1) as f64
            ),
            MaihdaWarning::SizeMismatch { first, second } => write!(
                f,
                "models were fit on data of different sizes ({} vs {} rows); \
                 bootstrap resamples the first model's rows for both",
                first, second
            ),
            MaihdaWarning::NotConverged { iterations, change } => write!(
                f,
                "fitter did not converge after {} iterations (change = {:.2e})",
                iterations, change
            ),
            MaihdaWarning::SingularFit { group } => write!(
                f,
                "boundary (singular) fit: variance of '{}' estimated as 0",
                group
            ),
        }
    }
}
