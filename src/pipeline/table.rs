//! Tabular artifact representation and its delimited-text codec
//!
//! Every artifact flowing between stages is a [`Table`]: a header of column names and
//! rows of string cells. Columns a stage does not understand are carried through
//! untouched, and consumers always look columns up by name.

use std::io::Read;
use thiserror::Error;

/// Errors raised while building, encoding or decoding a table
#[derive(Error, Debug)]
pub enum TableError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing column '{column}'")]
    MissingColumn { column: String },

    #[error("Row has {found} cells but the header has {expected} columns")]
    RowWidth { expected: usize, found: usize },

    #[error("Invalid value '{value}' in column '{column}' (row {row}): {reason}")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
        reason: String,
    },

    #[error("Failed to flush encoded table: {0}")]
    Encode(String),
}

/// A header plus rows of string cells
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// An empty table with the same header as `self`
    pub fn empty_like(&self) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row; its width must match the header
    pub fn push_row(&mut self, row: Vec<String>) -> Result<(), TableError> {
        if row.len() != self.columns.len() {
            return Err(TableError::RowWidth {
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize, TableError> {
        self.column_index(name)
            .ok_or_else(|| TableError::MissingColumn {
                column: name.to_string(),
            })
    }

    /// Parse every cell of `column` with `parse`, reporting the first failure
    pub fn parse_column<T, F, E>(&self, column: &str, parse: F) -> Result<Vec<T>, TableError>
    where
        F: Fn(&str) -> Result<T, E>,
        E: std::fmt::Display,
    {
        let index = self.require_column(column)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(row, cells)| {
                let value = &cells[index];
                parse(value).map_err(|e| TableError::InvalidValue {
                    column: column.to_string(),
                    row,
                    value: value.clone(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    /// Decode a header-first delimited table.
    ///
    /// Cells that are not valid UTF-8 are decoded lossily; raw exports are not always
    /// clean.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, TableError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let columns = csv_reader
            .byte_headers()?
            .iter()
            .map(|cell| String::from_utf8_lossy(cell).into_owned())
            .collect();

        let mut table = Table {
            columns,
            rows: Vec::new(),
        };
        for record in csv_reader.byte_records() {
            let record = record?;
            let row = record
                .iter()
                .map(|cell| String::from_utf8_lossy(cell).into_owned())
                .collect();
            table.push_row(row)?;
        }

        Ok(table)
    }

    pub fn from_csv_slice(bytes: &[u8]) -> Result<Self, TableError> {
        Self::from_csv_reader(bytes)
    }

    /// Encode as header-first comma-delimited text.
    ///
    /// The encoding is deterministic: equal tables always produce equal bytes.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, TableError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());

        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }

        writer
            .into_inner()
            .map_err(|e| TableError::Encode(e.error().to_string()))
    }
}
