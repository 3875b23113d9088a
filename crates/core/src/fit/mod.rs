//! Model fitting.
//!
//! [`FittedModel::builder`] validates the inputs, resolves the family and
//! engine, and hands the work to a [`MixedModelFitter`]. The built-in
//! [`RemlFitter`] covers the frequentist engine; other backends plug in
//! through the same trait.

mod engine;
mod fitter;
mod model;

pub use engine::Engine;
pub use fitter::{FitOptions, MixedModelFitter, ModelHandle, RemlFitter, RemlModel};
pub use model::{FitBuilder, FittedModel};
