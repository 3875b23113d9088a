//! Multilevel analysis of individual heterogeneity and discriminatory
//! accuracy (MAIHDA).
//!
//! The pipeline runs [`strata::build_strata`] to assign observations to
//! intersectional strata, fits a random-intercept model with
//! [`fit::FittedModel::builder`], and reads the variance partition off the
//! result with [`variance`], [`bootstrap`] and [`pvc`].

pub mod bootstrap;
pub mod data;
pub mod error;
pub mod fit;
pub mod glmm;
pub mod lmm;
pub mod matrix;
pub mod model;
pub mod pvc;
pub mod report;
pub mod strata;
pub mod types;
pub mod variance;

#[cfg(test)]
mod test_support;

pub use bootstrap::{bootstrap_vpc, BootstrapConfig, BootstrapInterval};
pub use data::DataFrame;
pub use error::{MaihdaError, MaihdaWarning, Result};
pub use fit::{Engine, FitOptions, FittedModel};
pub use glmm::Family;
pub use pvc::{calculate_pvc, PvcOptions, PvcResult};
pub use strata::{build_strata, StrataOptions, StrataTable};
pub use variance::{between_stratum_variance, residual_variance, variance_components, vpc};
