use crate::data::DataFrame;
use crate::error::{MaihdaError, Result};
use crate::types::SparseMat;

use super::design::{
    build_fixed_design, build_random_design, numeric_value, resolve_fixed_terms,
    FixedEffectLabel, FixedTerm,
};
use super::formula::Formula;

/// A fully specified random-intercept model, ready for fitting.
///
/// Only complete rows of the source table enter the model frame: rows
/// missing the response, any fixed term, or the grouping field are dropped.
#[derive(Debug, Clone)]
pub struct MixedModel {
    /// Number of observations in the model frame.
    pub n_obs: usize,
    /// Source-table row index of each observation.
    pub rows: Vec<usize>,
    /// Response vector (y).
    pub y: Vec<f64>,
    /// Fixed effects design matrix (X).
    pub x: SparseMat,
    /// Resolved fixed terms, reused to encode new data for prediction.
    pub fixed_terms: Vec<FixedTerm>,
    /// Labels for fixed effect columns.
    pub fixed_labels: Vec<FixedEffectLabel>,
    /// Random-intercept incidence matrix (Z).
    pub z: SparseMat,
    /// Grouping field name.
    pub group_name: String,
    /// Level names of the grouping field, one per column of Z.
    pub group_levels: Vec<String>,
}

impl MixedModel {
    /// Number of fixed-effect columns.
    pub fn n_fixed(&self) -> usize {
        self.x.cols()
    }

    /// Number of groups.
    pub fn n_groups(&self) -> usize {
        self.z.cols()
    }
}

/// Builder for constructing a [`MixedModel`] from a formula and a table.
pub struct MixedModelBuilder<'a> {
    data: Option<&'a DataFrame>,
    formula: Option<&'a Formula>,
}

impl<'a> MixedModelBuilder<'a> {
    pub fn new() -> Self {
        Self {
            data: None,
            formula: None,
        }
    }

    /// Set the data source.
    pub fn data(mut self, df: &'a DataFrame) -> Self {
        self.data = Some(df);
        self
    }

    /// Set the model formula.
    pub fn formula(mut self, formula: &'a Formula) -> Self {
        self.formula = Some(formula);
        self
    }

    /// Build the model. Validates all inputs and constructs design matrices.
    pub fn build(self) -> Result<MixedModel> {
        let df = self
            .data
            .ok_or_else(|| MaihdaError::InvalidArgument("No data provided".into()))?;
        let formula = self
            .formula
            .ok_or_else(|| MaihdaError::InvalidArgument("No formula provided".into()))?;

        if df.nrows() == 0 {
            return Err(MaihdaError::InvalidArgument("DataFrame is empty".into()));
        }
        formula.validate(df)?;

        let response = df.get_column(formula.response())?;
        if matches!(response, crate::data::Column::Factor(_)) {
            return Err(MaihdaError::InvalidArgument(format!(
                "response '{}' must be numeric",
                formula.response()
            )));
        }

        // Listwise deletion over every field the formula reads.
        let columns = formula
            .variables()
            .into_iter()
            .map(|v| df.get_column(v))
            .collect::<Result<Vec<_>>>()?;
        let rows: Vec<usize> = (0..df.nrows())
            .filter(|&r| columns.iter().all(|c| !c.is_missing(r)))
            .collect();

        if rows.is_empty() {
            return Err(MaihdaError::InvalidArgument(format!(
                "no complete observations for '{}'",
                formula
            )));
        }

        let y: Vec<f64> = rows
            .iter()
            .filter_map(|&r| numeric_value(response, r))
            .collect();

        let fixed_terms =
            resolve_fixed_terms(df, formula.fixed_terms(), formula.has_intercept(), &rows)?;
        let (x, fixed_labels) = build_fixed_design(df, &fixed_terms, &rows)?;
        let (z, group_levels) = build_random_design(df, formula.group(), &rows)?;

        if x.cols() >= rows.len() {
            return Err(MaihdaError::InvalidArgument(format!(
                "{} fixed-effect columns for {} observations",
                x.cols(),
                rows.len()
            )));
        }

        log::debug!(
            "model frame: {} of {} rows, {} fixed columns, {} groups",
            rows.len(),
            df.nrows(),
            x.cols(),
            z.cols()
        );

        Ok(MixedModel {
            n_obs: rows.len(),
            rows,
            y,
            x,
            fixed_terms,
            fixed_labels,
            z,
            group_name: formula.group().to_string(),
            group_levels,
        })
    }
}

impl<'a> Default for MixedModelBuilder<'a> {
    fn default() -> Self {
        Self::new()
    }
}
