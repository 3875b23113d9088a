mod mme;
mod reml;
mod result;

pub use mme::{MixedModelEquations, MmeSolution};
pub use reml::{Dispersion, EmReml};
pub use result::{FitResult, NamedEffect, RemlIteration, VarianceEstimate};
