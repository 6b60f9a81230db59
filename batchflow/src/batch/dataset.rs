//! The employee CSV dataset.

use crate::errors::DataSourceError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Columns every dataset must provide.
pub const REQUIRED_COLUMNS: [&str; 6] = ["id", "name", "age", "city", "salary", "department"];

/// One row of the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    /// Employee identifier.
    pub id: u64,
    /// Full name.
    pub name: String,
    /// Age in years.
    pub age: u32,
    /// City of residence.
    pub city: String,
    /// Annual salary.
    pub salary: f64,
    /// Department name.
    pub department: String,
}

/// A validated dataset loaded from disk.
#[derive(Debug, Clone)]
pub struct Dataset {
    path: PathBuf,
    columns: Vec<String>,
    rows: Vec<Employee>,
}

impl Dataset {
    /// Loads and validates a dataset.
    ///
    /// Checks run in order: the file exists, it has at least one data row,
    /// the header has every required column, and every row parses.
    ///
    /// # Errors
    ///
    /// Returns the matching [`DataSourceError`] variant for each check.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DataSourceError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DataSourceError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| csv_error(path, e))?;

        let headers = reader.headers().map_err(|e| csv_error(path, e))?.clone();
        let records = reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| csv_error(path, e))?;

        if records.is_empty() {
            return Err(DataSourceError::Empty {
                path: path.to_path_buf(),
            });
        }

        let columns: Vec<String> = headers.iter().map(str::to_string).collect();
        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|required| !columns.iter().any(|c| c == *required))
            .map(|c| (*c).to_string())
            .collect();
        if !missing.is_empty() {
            return Err(DataSourceError::MissingColumns { missing });
        }

        let rows = records
            .iter()
            .map(|record| record.deserialize::<Employee>(Some(&headers)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| csv_error(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            columns,
            rows,
        })
    }

    /// Returns the source path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the header columns, in file order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the rows.
    #[must_use]
    pub fn rows(&self) -> &[Employee] {
        &self.rows
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Writes rows as CSV with the required columns as header.
///
/// The header is written even when `rows` is empty.
///
/// # Errors
///
/// Returns `DataSourceError::Io` if the file cannot be written.
pub fn write_rows(path: impl AsRef<Path>, rows: &[Employee]) -> Result<(), DataSourceError> {
    let path = path.as_ref();
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    writer
        .write_record(REQUIRED_COLUMNS)
        .map_err(|e| csv_error(path, e))?;
    for row in rows {
        writer.serialize(row).map_err(|e| csv_error(path, e))?;
    }
    writer.flush().map_err(|source| DataSourceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn csv_error(path: &Path, err: csv::Error) -> DataSourceError {
    if err.is_io_error() {
        if let csv::ErrorKind::Io(source) = err.into_kind() {
            return DataSourceError::Io {
                path: path.to_path_buf(),
                source,
            };
        }
        return DataSourceError::Malformed {
            path: path.to_path_buf(),
            reason: "unknown IO failure".to_string(),
        };
    }
    DataSourceError::Malformed {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
