use std::path::Path;

use crate::error::{MaihdaError, Result};

use super::dataframe::{Column, DataFrame};
use super::factor::FactorColumn;

/// Returns `true` for cells that denote a missing value.
fn is_na(field: &str) -> bool {
    field.is_empty() || field.eq_ignore_ascii_case("na")
}

impl DataFrame {
    /// Read a CSV file into a DataFrame.
    ///
    /// The first row is treated as a header. Empty cells and `NA` (any case)
    /// are missing. Each column is auto-detected:
    /// - If every non-missing value parses as `f64`, it becomes a `Float`
    ///   column with `NaN` for missing cells.
    /// - Otherwise it becomes a `Factor` column (categorical).
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, if the CSV is malformed,
    /// or if rows have inconsistent numbers of fields.
    ///
    /// # Examples
    /// ```no_run
    /// use maihda_core::data::DataFrame;
    ///
    /// let df = DataFrame::from_csv("survey.csv").unwrap();
    /// println!("rows = {}, cols = {}", df.nrows(), df.ncols());
    /// ```
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .trim(csv::Trim::All)
            .from_path(path.as_ref())?;
        Self::from_csv_reader(reader)
    }

    /// Parse CSV text held in memory. Same rules as [`DataFrame::from_csv`].
    pub fn from_csv_str(text: &str) -> Result<Self> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());
        Self::from_csv_reader(reader)
    }

    fn from_csv_reader<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Self> {
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.to_string())
            .collect();

        if headers.is_empty() {
            return Ok(DataFrame::new());
        }

        let ncols = headers.len();
        let mut string_columns: Vec<Vec<String>> = vec![Vec::new(); ncols];

        for result in reader.records() {
            let record = result?;
            if record.len() != ncols {
                return Err(MaihdaError::InvalidArgument(format!(
                    "Row has {} fields but header has {} columns",
                    record.len(),
                    ncols
                )));
            }
            for (i, field) in record.iter().enumerate() {
                string_columns[i].push(field.to_string());
            }
        }

        if string_columns[0].is_empty() {
            return Ok(DataFrame::new());
        }

        let mut df = DataFrame::new();

        for (header, raw) in headers.iter().zip(string_columns.iter()) {
            let float_values: std::result::Result<Vec<f64>, _> = raw
                .iter()
                .map(|s| {
                    if is_na(s) {
                        Ok(f64::NAN)
                    } else {
                        s.parse::<f64>()
                    }
                })
                .collect();

            let column = match float_values {
                Ok(values) => Column::Float(values),
                Err(_) => {
                    let cells: Vec<Option<&str>> = raw
                        .iter()
                        .map(|s| if is_na(s) { None } else { Some(s.as_str()) })
                        .collect();
                    Column::Factor(FactorColumn::with_missing(&cells))
                }
            };
            df.validate_and_insert(header, column)?;
        }

        Ok(df)
    }

    /// Write the frame as CSV with a header row. Missing cells are written
    /// as `NA`.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path.as_ref())?;
        self.write_csv(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Write the frame as CSV into any writer.
    pub fn write_csv<W: std::io::Write>(&self, writer: &mut csv::Writer<W>) -> Result<()> {
        writer.write_record(self.columns.keys())?;
        for row in 0..self.nrows {
            let record: Vec<String> = self
                .columns
                .values()
                .map(|col| col.display_value(row).unwrap_or_else(|| "NA".to_string()))
                .collect();
            writer.write_record(&record)?;
        }
        Ok(())
    }
}
