use std::collections::BTreeMap;

use crate::data::{Column, DataFrame};
use crate::error::{MaihdaError, Result};

use super::table::{StrataTable, StratumInfo};

/// Name of the column added by [`build_strata`].
pub const STRATUM_COLUMN: &str = "stratum";

/// Column names taken by the augmented frame and by
/// [`StrataTable::to_dataframe`](super::StrataTable::to_dataframe); a stratum
/// variable may not use them.
const RESERVED_NAMES: [&str; 3] = [STRATUM_COLUMN, "label", "n"];

/// Options controlling stratum construction.
#[derive(Debug, Clone)]
pub struct StrataOptions {
    separator: String,
    min_count: usize,
}

impl StrataOptions {
    /// Defaults: separator `"_"`, minimum count 1.
    pub fn new() -> Self {
        Self {
            separator: "_".to_string(),
            min_count: 1,
        }
    }

    /// Set the label separator (default `"_"`).
    pub fn separator(mut self, sep: &str) -> Self {
        self.separator = sep.to_string();
        self
    }

    /// Set the minimum number of complete rows a combination needs to form a
    /// stratum (default 1).
    pub fn min_count(mut self, n: usize) -> Self {
        self.min_count = n;
        self
    }

    pub fn get_separator(&self) -> &str {
        &self.separator
    }

    pub fn get_min_count(&self) -> usize {
        self.min_count
    }
}

impl Default for StrataOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Assign every row of `df` to an intersectional stratum.
///
/// A row is complete when none of `vars` is missing. Complete rows are keyed
/// by their values joined with the separator; keys seen at least `min_count`
/// times are sorted lexicographically (byte order) and numbered `1..=K`.
/// Incomplete rows and rows of rarer combinations get a null stratum.
///
/// Returns a copy of `df` with an integer `stratum` column plus the
/// per-stratum metadata. Zero surviving strata is a valid result.
///
/// # Errors
/// - `InvalidArgument` if `df` is empty, `vars` is empty, the separator is
///   empty, `min_count` is zero, a variable uses a reserved column name
///   (`stratum`, `label`, `n`), a value contains the separator (its label
///   could not be split back into variable values), or two different
///   combinations render as the same label.
/// - `MissingColumns` naming every entry of `vars` absent from `df`.
pub fn build_strata(
    df: &DataFrame,
    vars: &[&str],
    options: &StrataOptions,
) -> Result<(DataFrame, StrataTable)> {
    if df.nrows() == 0 || df.ncols() == 0 {
        return Err(MaihdaError::InvalidArgument(
            "data must be a non-empty table".into(),
        ));
    }
    if vars.is_empty() {
        return Err(MaihdaError::InvalidArgument(
            "at least one stratum variable is required".into(),
        ));
    }
    if options.separator.is_empty() {
        return Err(MaihdaError::InvalidArgument(
            "stratum label separator must not be empty".into(),
        ));
    }
    if options.min_count == 0 {
        return Err(MaihdaError::InvalidArgument(
            "min_count must be at least 1".into(),
        ));
    }
    if let Some(name) = vars.iter().find(|v| RESERVED_NAMES.contains(*v)) {
        return Err(MaihdaError::InvalidArgument(format!(
            "stratum variable '{}' uses a reserved column name ({}); rename it first",
            name,
            RESERVED_NAMES.join(", ")
        )));
    }

    let missing: Vec<String> = vars
        .iter()
        .filter(|v| !df.has_column(v))
        .map(|v| v.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(MaihdaError::MissingColumns(missing));
    }

    let columns: Vec<&Column> = vars
        .iter()
        .map(|v| df.get_column(v))
        .collect::<Result<_>>()?;

    // Label of every complete row, None for incomplete rows.
    let mut row_labels: Vec<Option<String>> = Vec::with_capacity(df.nrows());
    let mut counts: BTreeMap<String, (usize, Vec<String>)> = BTreeMap::new();

    for row in 0..df.nrows() {
        let values: Option<Vec<String>> =
            columns.iter().map(|col| col.display_value(row)).collect();
        let Some(values) = values else {
            row_labels.push(None);
            continue;
        };

        for (var, value) in vars.iter().zip(values.iter()) {
            if value.contains(options.separator.as_str()) {
                return Err(MaihdaError::InvalidArgument(format!(
                    "value '{}' of stratum variable '{}' contains the separator '{}'; \
                     choose a different separator",
                    value, var, options.separator
                )));
            }
        }

        let label = values.join(&options.separator);
        let entry = counts.entry(label.clone()).or_insert_with(|| (0, values.clone()));
        if entry.1 != values {
            return Err(MaihdaError::InvalidArgument(format!(
                "combinations ({}) and ({}) both render as label '{}'; \
                 choose a different separator",
                entry.1.join(", "),
                values.join(", "),
                label
            )));
        }
        entry.0 += 1;
        row_labels.push(Some(label));
    }

    // BTreeMap iteration is already sorted by label.
    let mut ids: BTreeMap<&str, usize> = BTreeMap::new();
    let mut strata = Vec::new();
    for (label, (n, values)) in counts.iter() {
        if *n < options.min_count {
            continue;
        }
        let id = strata.len() + 1;
        ids.insert(label.as_str(), id);
        strata.push(StratumInfo {
            stratum: id,
            label: label.clone(),
            n: *n,
            values: values.clone(),
        });
    }

    let assignment: Vec<Option<i64>> = row_labels
        .iter()
        .map(|label| {
            label
                .as_deref()
                .and_then(|l| ids.get(l))
                .map(|&id| id as i64)
        })
        .collect();

    let n_assigned = assignment.iter().filter(|s| s.is_some()).count();
    log::debug!(
        "built {} strata from {} combinations; {}/{} rows assigned",
        strata.len(),
        counts.len(),
        n_assigned,
        df.nrows()
    );

    let augmented = df.with_column(STRATUM_COLUMN, Column::Integer(assignment))?;
    let table = StrataTable {
        variables: vars.iter().map(|v| v.to_string()).collect(),
        separator: options.separator.clone(),
        strata,
    };

    Ok((augmented, table))
}
