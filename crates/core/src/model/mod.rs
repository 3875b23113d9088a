mod builder;
mod design;
mod formula;

pub use builder::{MixedModel, MixedModelBuilder};
pub use design::{build_fixed_design, build_random_design, resolve_fixed_terms, FixedEffectLabel, FixedTerm};
pub use formula::Formula;
