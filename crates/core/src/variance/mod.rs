//! Variance extraction.
//!
//! Between-stratum and within-stratum variances of a fitted model, the
//! variance partition coefficient, and the three-row components table.

mod components;
mod extract;

pub use components::{variance_components, ComponentRow, VarianceComponents};
pub use extract::{between_stratum_variance, residual_variance, vpc};
