//! Proportional change in between-stratum variance between two models.

mod calculate;
mod result;

pub use calculate::{calculate_pvc, PvcOptions};
pub use result::PvcResult;
