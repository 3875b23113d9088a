use serde::Serialize;

use crate::data::{Column, DataFrame};
use crate::error::Result;

/// One valid intersectional stratum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StratumInfo {
    /// Stratum identifier, `1..=K`.
    pub stratum: usize,
    /// Stratum-variable values joined by the separator.
    pub label: String,
    /// Number of rows assigned to this stratum.
    pub n: usize,
    /// The individual stratum-variable values, in variable order.
    pub values: Vec<String>,
}

/// Per-stratum metadata produced alongside the augmented table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrataTable {
    /// Stratum variables in the order they were combined.
    pub variables: Vec<String>,
    /// Separator used to join labels.
    pub separator: String,
    /// One record per valid stratum, ordered by id.
    pub strata: Vec<StratumInfo>,
}

impl StrataTable {
    /// Number of valid strata (K).
    pub fn len(&self) -> usize {
        self.strata.len()
    }

    /// Returns `true` if no combination survived.
    pub fn is_empty(&self) -> bool {
        self.strata.is_empty()
    }

    /// Look up a stratum by id.
    pub fn get(&self, stratum: usize) -> Option<&StratumInfo> {
        stratum
            .checked_sub(1)
            .and_then(|i| self.strata.get(i))
            .filter(|info| info.stratum == stratum)
    }

    /// Label of a stratum, `None` for an unknown id.
    pub fn label(&self, stratum: usize) -> Option<&str> {
        self.get(stratum).map(|s| s.label.as_str())
    }

    /// Total number of rows that received a stratum.
    pub fn total_count(&self) -> usize {
        self.strata.iter().map(|s| s.n).sum()
    }

    /// Render the metadata as a frame with columns
    /// `stratum, label, n, <variables...>`.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut df = DataFrame::new();
        df.add_integer_column(
            "stratum",
            self.strata.iter().map(|s| Some(s.stratum as i64)).collect(),
        )?;
        let labels: Vec<&str> = self.strata.iter().map(|s| s.label.as_str()).collect();
        df.add_factor_column("label", &labels)?;
        df.add_integer_column("n", self.strata.iter().map(|s| Some(s.n as i64)).collect())?;
        for (j, var) in self.variables.iter().enumerate() {
            let values: Vec<&str> = self.strata.iter().map(|s| s.values[j].as_str()).collect();
            df.validate_and_insert(var, Column::Factor(crate::data::FactorColumn::new(&values)))?;
        }
        Ok(df)
    }
}
