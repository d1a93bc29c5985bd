//! Column-ordered tabular data crossing the adapter boundary.

use std::{cmp::Ordering, io::Write};

use thiserror::Error;

use crate::record::{Record, Value};

/// Errors produced by [`Frame`] operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FrameError {
    /// A pushed row did not match the frame's column count.
    #[error("row has {actual} cells but the frame has {expected} columns")]
    RowWidth {
        /// Number of columns in the frame.
        expected: usize,
        /// Number of cells in the rejected row.
        actual: usize,
    },
    /// A named column does not exist.
    #[error("column {name:?} does not exist")]
    UnknownColumn {
        /// The missing column name.
        name: String,
    },
    /// Writing the CSV rendering failed.
    #[error("failed to write CSV: {source}")]
    Csv {
        /// Error reported by the CSV writer.
        #[from]
        source: csv::Error,
    },
}

/// Ordered columns plus rows of dynamically-typed cells.
///
/// Frames are the plain tabular data the pipeline passes across the adapter
/// boundary. Unlike fetched [`Record`]s they are freely derived and
/// transformed by their owner.
///
/// # Examples
/// ```
/// # use verdant_core::{Frame, Value};
/// # fn main() -> Result<(), verdant_core::FrameError> {
/// let mut frame = Frame::new(["plot_id", "area"]);
/// frame.push_row(vec![Value::Text("007".to_owned()), Value::Number(1.5)])?;
/// assert_eq!(frame.len(), 1);
/// assert_eq!(frame.cell(0, "area"), Some(&Value::Number(1.5)));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Frame {
    /// Construct an empty frame with the given column names.
    pub fn new<I, N>(columns: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Build a frame from fetched records.
    ///
    /// Columns are the union of field names across all records, in
    /// first-seen order; fields a record lacks become [`Value::Null`].
    #[must_use]
    pub fn from_records(records: &[Record]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            for name in record.fields().keys() {
                if !columns.iter().any(|existing| existing == name) {
                    columns.push(name.clone());
                }
            }
        }
        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|name| record.field(name).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }

    /// The column names, in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the frame holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether a column with the given name exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Position of a column, if present.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Append a row; its cell count must match the column count.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), FrameError> {
        if row.len() != self.columns.len() {
            return Err(FrameError::RowWidth {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Iterate over the rows as cell slices.
    pub fn rows(&self) -> impl Iterator<Item = &[Value]> {
        self.rows.iter().map(Vec::as_slice)
    }

    /// Borrow a row by position.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<&[Value]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    /// Borrow a cell by row position and column name.
    #[must_use]
    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }

    /// Replace a cell by row position and column name.
    pub fn set_cell(&mut self, row: usize, column: &str, value: Value) -> Result<(), FrameError> {
        let index = self
            .column_index(column)
            .ok_or_else(|| FrameError::UnknownColumn {
                name: column.to_owned(),
            })?;
        if let Some(cell) = self.rows.get_mut(row).and_then(|cells| cells.get_mut(index)) {
            *cell = value;
        }
        Ok(())
    }

    /// Rename a column in place.
    pub fn rename_column(&mut self, from: &str, to: impl Into<String>) -> Result<(), FrameError> {
        let index = self
            .column_index(from)
            .ok_or_else(|| FrameError::UnknownColumn {
                name: from.to_owned(),
            })?;
        if let Some(column) = self.columns.get_mut(index) {
            *column = to.into();
        }
        Ok(())
    }

    /// Remove a column and its cells; removing an absent column is a no-op.
    ///
    /// Returns whether the column existed.
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(index) = self.column_index(name) else {
            return false;
        };
        self.columns.remove(index);
        for row in &mut self.rows {
            if index < row.len() {
                row.remove(index);
            }
        }
        true
    }

    /// Add a column filled with [`Value::Null`] if it does not already exist.
    pub fn ensure_column(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.has_column(&name) {
            return;
        }
        self.columns.push(name);
        for row in &mut self.rows {
            row.push(Value::Null);
        }
    }

    /// Transform every cell of a column in place.
    pub fn map_column<F>(&mut self, name: &str, mut transform: F) -> Result<(), FrameError>
    where
        F: FnMut(Value) -> Value,
    {
        let index = self
            .column_index(name)
            .ok_or_else(|| FrameError::UnknownColumn {
                name: name.to_owned(),
            })?;
        for row in &mut self.rows {
            if let Some(cell) = row.get_mut(index) {
                let current = std::mem::replace(cell, Value::Null);
                *cell = transform(current);
            }
        }
        Ok(())
    }

    /// Transform every cell of the frame in place.
    pub fn map_cells<F>(&mut self, mut transform: F)
    where
        F: FnMut(Value) -> Value,
    {
        for row in &mut self.rows {
            for cell in row {
                let current = std::mem::replace(cell, Value::Null);
                *cell = transform(current);
            }
        }
    }

    /// Keep only the rows the predicate accepts.
    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&[Value]) -> bool,
    {
        self.rows.retain(|row| keep(row.as_slice()));
    }

    /// Sort the rows with the supplied comparator.
    pub fn sort_rows_by<F>(&mut self, mut compare: F)
    where
        F: FnMut(&[Value], &[Value]) -> Ordering,
    {
        self.rows
            .sort_by(|left, right| compare(left.as_slice(), right.as_slice()));
    }

    /// Keep only the named columns, reordered to match `keep`.
    pub fn select_columns(&mut self, keep: &[&str]) -> Result<(), FrameError> {
        let mut indices = Vec::with_capacity(keep.len());
        for name in keep {
            let index = self
                .column_index(name)
                .ok_or_else(|| FrameError::UnknownColumn {
                    name: (*name).to_owned(),
                })?;
            indices.push(index);
        }
        self.columns = keep.iter().map(|name| (*name).to_owned()).collect();
        self.rows = self
            .rows
            .iter()
            .map(|row| {
                indices
                    .iter()
                    .map(|&index| row.get(index).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Ok(())
    }

    /// Iterate over the cells of a named column.
    pub fn column_values<'frame>(
        &'frame self,
        name: &str,
    ) -> Option<impl Iterator<Item = &'frame Value>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().filter_map(move |row| row.get(index)))
    }

    /// Write the frame as CSV, rendering each cell in its canonical text form.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), FrameError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(&self.columns)?;
        for row in &self.rows {
            csv_writer.write_record(row.iter().map(ToString::to_string))?;
        }
        csv_writer.flush().map_err(csv::Error::from)?;
        Ok(())
    }
}
