use sprs::TriMat;

use crate::data::{Column, DataFrame};
use crate::error::{MaihdaError, Result};
use crate::types::SparseMat;

/// A single fixed-effect term in the model, resolved against the model frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FixedTerm {
    /// An intercept (column of ones).
    Intercept,
    /// A continuous covariate.
    Covariate(String),
    /// A categorical column, dummy-coded with one column per listed level.
    /// The reference level, when there is one, has no column.
    Factor {
        name: String,
        reference: Option<String>,
        levels: Vec<String>,
    },
}

impl FixedTerm {
    /// Fill this term's design values for `row` of `df` into `out`.
    /// Returns `None` if the row cannot be encoded (missing value or a
    /// factor level the model has not seen).
    pub(crate) fn encode(&self, df: &DataFrame, row: usize, out: &mut Vec<f64>) -> Option<()> {
        match self {
            FixedTerm::Intercept => out.push(1.0),
            FixedTerm::Covariate(name) => {
                let v = numeric_value(df.get_column(name).ok()?, row)?;
                out.push(v);
            }
            FixedTerm::Factor {
                name,
                reference,
                levels,
            } => {
                let value = df.get_column(name).ok()?.display_value(row)?;
                let hit = levels.iter().position(|l| *l == value);
                if hit.is_none() && reference.as_deref() != Some(value.as_str()) {
                    return None;
                }
                out.extend((0..levels.len()).map(|j| if Some(j) == hit { 1.0 } else { 0.0 }));
            }
        }
        Some(())
    }
}

/// Label for a single column in the fixed-effects design matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedEffectLabel {
    pub term: String,
    pub level: String,
}

impl FixedEffectLabel {
    /// Display name, e.g. `(Intercept)`, `age`, `gender:M`.
    pub fn name(&self) -> String {
        if self.level.is_empty() {
            self.term.clone()
        } else {
            format!("{}:{}", self.term, self.level)
        }
    }
}

/// Numeric value of a cell, `None` when missing or not numeric.
pub(crate) fn numeric_value(col: &Column, row: usize) -> Option<f64> {
    match col {
        Column::Float(v) => Some(v[row]).filter(|x| !x.is_nan()),
        Column::Integer(v) => v[row].map(|i| i as f64),
        Column::Factor(_) => None,
    }
}

/// Distinct values of `col` among `rows`, in level order: factor columns keep
/// their level order, numeric columns sort ascending.
pub(crate) fn present_levels(col: &Column, rows: &[usize]) -> Vec<String> {
    match col {
        Column::Factor(f) => {
            let mut seen = vec![false; f.n_levels()];
            for &r in rows {
                if let Some(c) = f.code(r) {
                    seen[c] = true;
                }
            }
            seen.iter()
                .enumerate()
                .filter(|(_, &s)| s)
                .filter_map(|(c, _)| f.level_name(c).map(str::to_string))
                .collect()
        }
        Column::Integer(v) => {
            let mut vals: Vec<i64> = rows.iter().filter_map(|&r| v[r]).collect();
            vals.sort_unstable();
            vals.dedup();
            vals.iter().map(|i| i.to_string()).collect()
        }
        Column::Float(v) => {
            let mut vals: Vec<f64> = rows.iter().map(|&r| v[r]).filter(|x| !x.is_nan()).collect();
            vals.sort_by(|a, b| a.total_cmp(b));
            vals.dedup();
            vals.iter().map(|x| format!("{}", x)).collect()
        }
    }
}

/// Resolve formula terms into [`FixedTerm`]s using the levels present in the
/// model frame.
///
/// Float columns become covariates. Factor and Integer columns are
/// treatment-coded: when the model already has an intercept (or an earlier
/// full-rank factor) the first present level is the reference and gets no
/// column.
pub fn resolve_fixed_terms(
    df: &DataFrame,
    names: &[String],
    intercept: bool,
    rows: &[usize],
) -> Result<Vec<FixedTerm>> {
    let mut terms = Vec::new();
    let mut has_constant = intercept;
    if intercept {
        terms.push(FixedTerm::Intercept);
    }

    for name in names {
        match df.get_column(name)? {
            Column::Float(_) => terms.push(FixedTerm::Covariate(name.clone())),
            col => {
                let mut levels = present_levels(col, rows);
                let reference = if has_constant && !levels.is_empty() {
                    Some(levels.remove(0))
                } else {
                    None
                };
                has_constant = true;
                terms.push(FixedTerm::Factor {
                    name: name.clone(),
                    reference,
                    levels,
                });
            }
        }
    }

    Ok(terms)
}

/// Build a fixed-effects design matrix (X) for the given rows of `df`.
///
/// Returns a sparse matrix of dimension (rows x p) where p is the total
/// number of fixed-effect columns.
pub fn build_fixed_design(
    df: &DataFrame,
    terms: &[FixedTerm],
    rows: &[usize],
) -> Result<(SparseMat, Vec<FixedEffectLabel>)> {
    let n = rows.len();
    if n == 0 {
        return Err(MaihdaError::InvalidArgument(
            "model frame has no complete observations".into(),
        ));
    }

    let mut labels = Vec::new();
    for term in terms {
        match term {
            FixedTerm::Intercept => labels.push(FixedEffectLabel {
                term: "(Intercept)".to_string(),
                level: String::new(),
            }),
            FixedTerm::Covariate(name) => labels.push(FixedEffectLabel {
                term: name.clone(),
                level: String::new(),
            }),
            FixedTerm::Factor { name, levels, .. } => {
                for level in levels {
                    labels.push(FixedEffectLabel {
                        term: name.clone(),
                        level: level.clone(),
                    });
                }
            }
        }
    }

    let p = labels.len();
    let mut tri = TriMat::new((n, p));
    let mut buf = Vec::with_capacity(p);

    for (i, &row) in rows.iter().enumerate() {
        buf.clear();
        for term in terms {
            term.encode(df, row, &mut buf).ok_or_else(|| {
                MaihdaError::InvalidArgument(format!("row {} cannot be encoded in the design", row))
            })?;
        }
        for (j, &val) in buf.iter().enumerate() {
            if val != 0.0 {
                tri.add_triplet(i, j, val);
            }
        }
    }

    Ok((tri.to_csc(), labels))
}

/// Build the random-intercept incidence matrix (Z) for the given rows.
///
/// For observation i in group level k, Z[i, k] = 1. Only levels present in
/// `rows` get a column. Returns the matrix and the level names.
pub fn build_random_design(
    df: &DataFrame,
    column: &str,
    rows: &[usize],
) -> Result<(SparseMat, Vec<String>)> {
    let col = df.get_column(column)?;
    let levels = present_levels(col, rows);
    let index: std::collections::HashMap<&str, usize> = levels
        .iter()
        .enumerate()
        .map(|(k, l)| (l.as_str(), k))
        .collect();

    let mut tri = TriMat::new((rows.len(), levels.len()));
    for (i, &row) in rows.iter().enumerate() {
        let value = col.display_value(row).ok_or_else(|| {
            MaihdaError::InvalidArgument(format!("row {} has no '{}' value", row, column))
        })?;
        if let Some(&k) = index.get(value.as_str()) {
            tri.add_triplet(i, k, 1.0);
        }
    }

    Ok((tri.to_csc(), levels))
}
