//! Construction of intersectional strata.
//!
//! A stratum is one combination of values across a set of categorical
//! variables. [`build_strata`] numbers the valid combinations and returns the
//! augmented table together with a [`StrataTable`] describing each stratum.

mod builder;
mod table;

pub use builder::{build_strata, StrataOptions, STRATUM_COLUMN};
pub use table::{StrataTable, StratumInfo};
