//! Reporting layer: summaries, predictions and model comparison.

mod compare;
mod predict;
mod summary;

pub use compare::{compare, Comparison, ComparisonRow};
pub use predict::{predict, PredictionScale};
pub use summary::{summarize, MaihdaSummary, StratumEstimate};
