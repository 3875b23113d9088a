use indexmap::IndexMap;

use super::factor::FactorColumn;
use crate::error::{MaihdaError, Result};

/// A single column in a [`DataFrame`], which can hold floating-point numbers,
/// integers, or categorical (factor) data. Every variant can represent a
/// missing cell.
#[derive(Debug, Clone)]
pub enum Column {
    /// A column of 64-bit floating-point values. `NaN` marks a missing cell.
    Float(Vec<f64>),
    /// A column of 64-bit signed integers.
    Integer(Vec<Option<i64>>),
    /// A categorical column with string levels mapped to integer codes.
    Factor(FactorColumn),
}

impl Column {
    /// Returns the number of elements in the column.
    pub fn len(&self) -> usize {
        match self {
            Column::Float(v) => v.len(),
            Column::Integer(v) => v.len(),
            Column::Factor(f) => f.len(),
        }
    }

    /// Returns `true` if the column is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the cell at `row` is missing.
    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            Column::Float(v) => v[row].is_nan(),
            Column::Integer(v) => v[row].is_none(),
            Column::Factor(f) => f.code(row).is_none(),
        }
    }

    /// Render the cell at `row` as text, `None` when it is missing.
    pub fn display_value(&self, row: usize) -> Option<String> {
        match self {
            Column::Float(v) => {
                let x = v[row];
                if x.is_nan() {
                    None
                } else if x == 0.0 {
                    // -0.0 == 0.0 and must render the same way
                    Some("0".to_string())
                } else {
                    Some(format!("{}", x))
                }
            }
            Column::Integer(v) => v[row].map(|i| i.to_string()),
            Column::Factor(f) => f.value(row).map(str::to_string),
        }
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Column::Float(_) => "Float",
            Column::Integer(_) => "Integer",
            Column::Factor(_) => "Factor",
        }
    }

    fn take(&self, rows: &[usize]) -> Column {
        match self {
            Column::Float(v) => Column::Float(rows.iter().map(|&r| v[r]).collect()),
            Column::Integer(v) => Column::Integer(rows.iter().map(|&r| v[r]).collect()),
            Column::Factor(f) => Column::Factor(f.take(rows)),
        }
    }
}

/// A lightweight columnar DataFrame holding an observation table.
///
/// Columns are stored in insertion order using an [`IndexMap`]. All columns
/// must have the same number of rows. Operations that augment or resample
/// the table return a new frame and leave the receiver untouched.
#[derive(Debug, Clone)]
pub struct DataFrame {
    /// Ordered map of column name -> column data.
    pub(crate) columns: IndexMap<String, Column>,
    /// Number of rows (observations). Zero when the DataFrame is empty.
    pub(crate) nrows: usize,
}

impl DataFrame {
    /// Create an empty DataFrame with no columns and no rows.
    pub fn new() -> Self {
        DataFrame {
            columns: IndexMap::new(),
            nrows: 0,
        }
    }

    /// Add a floating-point column. `NaN` entries are treated as missing.
    ///
    /// # Errors
    /// Returns an error if the column length does not match existing rows,
    /// or if a column with the same name already exists.
    pub fn add_float_column(&mut self, name: &str, data: Vec<f64>) -> Result<()> {
        self.validate_and_insert(name, Column::Float(data))
    }

    /// Add an integer column.
    ///
    /// # Errors
    /// Returns an error if the column length does not match existing rows,
    /// or if a column with the same name already exists.
    pub fn add_integer_column(&mut self, name: &str, data: Vec<Option<i64>>) -> Result<()> {
        self.validate_and_insert(name, Column::Integer(data))
    }

    /// Add a factor (categorical) column from a slice of string values.
    ///
    /// Levels are auto-discovered in order of first appearance.
    ///
    /// # Errors
    /// Returns an error if the column length does not match existing rows,
    /// or if a column with the same name already exists.
    pub fn add_factor_column(&mut self, name: &str, data: &[&str]) -> Result<()> {
        self.validate_and_insert(name, Column::Factor(FactorColumn::new(data)))
    }

    /// Add a factor column where `None` marks a missing value.
    pub fn add_factor_column_with_missing(
        &mut self,
        name: &str,
        data: &[Option<&str>],
    ) -> Result<()> {
        self.validate_and_insert(name, Column::Factor(FactorColumn::with_missing(data)))
    }

    /// Retrieve a column by name.
    ///
    /// # Errors
    /// Returns [`MaihdaError::ColumnNotFound`] if no column with the given name exists.
    pub fn get_column(&self, name: &str) -> Result<&Column> {
        self.columns
            .get(name)
            .ok_or_else(|| MaihdaError::ColumnNotFound(name.to_string()))
    }

    /// Returns `true` if a column with this name exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Retrieve a float column's data as a slice.
    ///
    /// # Errors
    /// Returns an error if the column does not exist or is not a `Float` column.
    pub fn get_float(&self, name: &str) -> Result<&[f64]> {
        match self.get_column(name)? {
            Column::Float(v) => Ok(v.as_slice()),
            other => Err(MaihdaError::InvalidArgument(format!(
                "Column '{}' is a {} column, not Float",
                name,
                other.type_name()
            ))),
        }
    }

    /// Retrieve an integer column's data as a slice.
    pub fn get_integer(&self, name: &str) -> Result<&[Option<i64>]> {
        match self.get_column(name)? {
            Column::Integer(v) => Ok(v.as_slice()),
            other => Err(MaihdaError::InvalidArgument(format!(
                "Column '{}' is a {} column, not Integer",
                name,
                other.type_name()
            ))),
        }
    }

    /// Retrieve a factor column reference.
    ///
    /// # Errors
    /// Returns an error if the column does not exist or is not a `Factor` column.
    pub fn get_factor(&self, name: &str) -> Result<&FactorColumn> {
        match self.get_column(name)? {
            Column::Factor(f) => Ok(f),
            other => Err(MaihdaError::InvalidArgument(format!(
                "Column '{}' is a {} column, not Factor",
                name,
                other.type_name()
            ))),
        }
    }

    /// Returns the number of rows.
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Returns the number of columns.
    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    /// Returns a vector of column names in insertion order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.keys().map(|s| s.as_str()).collect()
    }

    /// Return a copy of this frame with `column` added under `name`.
    ///
    /// An existing column with the same name is replaced in place, keeping
    /// its position.
    pub fn with_column(&self, name: &str, column: Column) -> Result<DataFrame> {
        if !self.columns.is_empty() && column.len() != self.nrows {
            return Err(MaihdaError::DimensionMismatch {
                expected: self.nrows,
                got: column.len(),
                context: format!("adding column '{}'", name),
            });
        }
        let mut out = self.clone();
        if out.columns.is_empty() {
            out.nrows = column.len();
        }
        out.columns.insert(name.to_string(), column);
        Ok(out)
    }

    /// Build a new frame from the given row indices, in order. Indices may
    /// repeat, which is how bootstrap resamples are materialised.
    ///
    /// # Errors
    /// Returns an error if any index is out of range.
    pub fn take_rows(&self, rows: &[usize]) -> Result<DataFrame> {
        if let Some(&bad) = rows.iter().find(|&&r| r >= self.nrows) {
            return Err(MaihdaError::InvalidArgument(format!(
                "Row index {} out of range for DataFrame with {} rows",
                bad, self.nrows
            )));
        }
        let columns = self
            .columns
            .iter()
            .map(|(name, col)| (name.clone(), col.take(rows)))
            .collect();
        Ok(DataFrame {
            columns,
            nrows: rows.len(),
        })
    }

    // ---- internal helpers ----

    /// Validate column length and name uniqueness, then insert.
    pub(crate) fn validate_and_insert(&mut self, name: &str, column: Column) -> Result<()> {
        if self.columns.contains_key(name) {
            return Err(MaihdaError::InvalidArgument(format!(
                "Column '{}' already exists in DataFrame",
                name
            )));
        }

        let col_len = column.len();

        if self.columns.is_empty() {
            self.nrows = col_len;
        } else if col_len != self.nrows {
            return Err(MaihdaError::DimensionMismatch {
                expected: self.nrows,
                got: col_len,
                context: format!("adding column '{}'", name),
            });
        }

        self.columns.insert(name.to_string(), column);
        Ok(())
    }
}

impl Default for DataFrame {
    fn default() -> Self {
        Self::new()
    }
}
