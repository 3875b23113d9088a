use indexmap::IndexMap;

/// A categorical (factor) column that maps string levels to integer codes.
///
/// Levels are discovered in order of first appearance and assigned 0-based
/// codes. A missing observation has no code.
#[derive(Debug, Clone)]
pub struct FactorColumn {
    /// Maps level string -> integer code (0-based), ordered by first appearance.
    levels: IndexMap<String, usize>,
    /// The integer code for each observation, `None` when missing.
    codes: Vec<Option<usize>>,
}

impl FactorColumn {
    /// Create a new `FactorColumn` from a slice of string values with no
    /// missing entries.
    ///
    /// # Examples
    /// ```
    /// use maihda_core::data::FactorColumn;
    ///
    /// let col = FactorColumn::new(&["A", "B", "A", "C", "B"]);
    /// assert_eq!(col.n_levels(), 3);
    /// assert_eq!(col.code(3), Some(2));
    /// ```
    pub fn new(values: &[&str]) -> Self {
        let opt: Vec<Option<&str>> = values.iter().map(|&v| Some(v)).collect();
        Self::with_missing(&opt)
    }

    /// Create a `FactorColumn` where `None` marks a missing observation.
    /// Missing entries never create a level.
    pub fn with_missing(values: &[Option<&str>]) -> Self {
        let mut levels = IndexMap::new();
        let mut codes = Vec::with_capacity(values.len());

        for val in values {
            let code = val.map(|v| {
                let next_code = levels.len();
                *levels.entry(v.to_string()).or_insert(next_code)
            });
            codes.push(code);
        }

        FactorColumn { levels, codes }
    }

    /// Build a column that shares this column's level set but takes its
    /// observations from `rows` (indices may repeat).
    pub(crate) fn take(&self, rows: &[usize]) -> Self {
        FactorColumn {
            levels: self.levels.clone(),
            codes: rows.iter().map(|&r| self.codes[r]).collect(),
        }
    }

    /// Returns the number of distinct levels.
    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    /// Returns the integer codes for each observation.
    pub fn codes(&self) -> &[Option<usize>] {
        &self.codes
    }

    /// Returns the code of observation `row`, `None` when it is missing.
    pub fn code(&self, row: usize) -> Option<usize> {
        self.codes.get(row).copied().flatten()
    }

    /// Returns a reference to the ordered level map (level name -> code).
    pub fn levels(&self) -> &IndexMap<String, usize> {
        &self.levels
    }

    /// Returns the level name for a given integer code, or `None` if the code
    /// is out of range.
    pub fn level_name(&self, code: usize) -> Option<&str> {
        self.levels
            .get_index(code)
            .map(|(name, _)| name.as_str())
    }

    /// Returns the level name of observation `row`, `None` when it is missing.
    pub fn value(&self, row: usize) -> Option<&str> {
        self.code(row).and_then(|c| self.level_name(c))
    }

    /// Returns the number of observations (rows).
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Returns `true` if the column has no observations.
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}
