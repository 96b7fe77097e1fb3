use polars::error::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Weather CSV is missing its two-line location preamble")]
    MissingPreamble,

    #[error("Weather CSV is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Column '{column}' has no value at data row {row}")]
    MissingValue { column: String, row: usize },

    #[error("Data row {row} does not describe a valid date and time")]
    InvalidTimestamp { row: usize },

    #[error("Weather CSV contains no data rows")]
    Empty,

    #[error("Weather data has no rows in year {0}")]
    NoRowsForYear(i32),

    #[error("Location field '{field}' has invalid value '{value}'")]
    InvalidMetadata { field: String, value: String },

    #[error("Failed processing weather CSV: {0}")]
    Csv(#[from] PolarsError),

    #[error("I/O error while writing weather CSV")]
    Io(#[from] std::io::Error),
}
