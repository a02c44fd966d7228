//! Column-oriented in-memory table used by the dataset collaborators.

use std::collections::HashSet;

use crate::error::DatasetError;

/// Cell spellings treated as missing values when parsing text input.
const MISSING_MARKERS: &[&str] = &["", "na", "n/a", "nan", "null", "none"];

/// Values of a single column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Every present cell parsed as a number.
    Numeric(Vec<Option<f64>>),
    /// At least one present cell is not a number.
    Text(Vec<Option<String>>),
}

/// A named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Numeric(values),
        }
    }

    pub fn text(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Text(values),
        }
    }

    /// Builds a column from raw cells, inferring numeric vs text.
    pub fn infer(name: impl Into<String>, cells: &[String]) -> Self {
        let trimmed: Vec<Option<&str>> = cells
            .iter()
            .map(|c| {
                let c = c.trim();
                if is_missing(c) {
                    None
                } else {
                    Some(c)
                }
            })
            .collect();

        let parsed: Option<Vec<Option<f64>>> = trimmed
            .iter()
            .map(|cell| match cell {
                None => Some(None),
                Some(s) => s.parse::<f64>().ok().map(Some),
            })
            .collect();

        match parsed {
            Some(values) => Self::numeric(name, values),
            None => Self::text(
                name,
                trimmed
                    .into_iter()
                    .map(|c| c.map(str::to_string))
                    .collect(),
            ),
        }
    }

    pub fn len(&self) -> usize {
        match &self.data {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.data, ColumnData::Numeric(_))
    }

    /// Whether the cell at `row` is missing.
    pub fn is_missing(&self, row: usize) -> bool {
        match &self.data {
            ColumnData::Numeric(v) => v.get(row).map_or(true, Option::is_none),
            ColumnData::Text(v) => v.get(row).map_or(true, Option::is_none),
        }
    }

    /// Number of distinct present values.
    pub fn distinct_count(&self) -> usize {
        match &self.data {
            ColumnData::Numeric(v) => v
                .iter()
                .flatten()
                .map(|x| normalize_bits(*x))
                .collect::<HashSet<_>>()
                .len(),
            ColumnData::Text(v) => v.iter().flatten().collect::<HashSet<_>>().len(),
        }
    }

    /// Label representation of a cell, used for class labels.
    ///
    /// Integral numbers render without a fractional part so `1` and `1.0`
    /// name the same class.
    pub fn label_at(&self, row: usize) -> Option<String> {
        match &self.data {
            ColumnData::Numeric(v) => v.get(row).copied().flatten().map(format_label),
            ColumnData::Text(v) => v.get(row).cloned().flatten(),
        }
    }

    /// Returns a new column holding only the given rows, in order.
    pub fn take(&self, rows: &[usize]) -> Self {
        let data = match &self.data {
            ColumnData::Numeric(v) => {
                ColumnData::Numeric(rows.iter().map(|&i| v.get(i).copied().flatten()).collect())
            }
            ColumnData::Text(v) => {
                ColumnData::Text(rows.iter().map(|&i| v.get(i).cloned().flatten()).collect())
            }
        };
        Self {
            name: self.name.clone(),
            data,
        }
    }
}

/// An immutable table of equally sized columns.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    columns: Vec<Column>,
    n_rows: usize,
}

impl DataFrame {
    /// Creates a frame, checking that every column has the same length.
    pub fn new(columns: Vec<Column>) -> Result<Self, DatasetError> {
        let n_rows = columns.first().map_or(0, Column::len);
        if let Some(bad) = columns.iter().find(|c| c.len() != n_rows) {
            return Err(DatasetError::Parse {
                name: bad.name.clone(),
                message: format!("column has {} rows, expected {}", bad.len(), n_rows),
            });
        }
        Ok(Self { columns, n_rows })
    }

    /// Builds a frame from a header row and row-major string cells.
    pub fn from_rows(headers: Vec<String>, rows: &[Vec<String>]) -> Result<Self, DatasetError> {
        let mut columns = Vec::with_capacity(headers.len());
        for (idx, name) in headers.into_iter().enumerate() {
            let mut cells = Vec::with_capacity(rows.len());
            for (row_idx, row) in rows.iter().enumerate() {
                let cell = row.get(idx).ok_or_else(|| DatasetError::Parse {
                    name: name.clone(),
                    message: format!("row {} is missing column {}", row_idx + 1, idx + 1),
                })?;
                cells.push(cell.clone());
            }
            columns.push(Column::infer(name, &cells));
        }
        Self::new(columns)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn last_column(&self) -> Option<&Column> {
        self.columns.last()
    }

    /// Returns a new frame without the named columns.
    pub fn without_columns(&self, names: &[String]) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .filter(|c| !names.contains(&c.name))
                .cloned()
                .collect(),
            n_rows: self.n_rows,
        }
    }

    /// Returns a new frame holding only the given rows, in order.
    pub fn take_rows(&self, rows: &[usize]) -> Self {
        Self {
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
            n_rows: rows.len(),
        }
    }
}

fn is_missing(cell: &str) -> bool {
    MISSING_MARKERS.contains(&cell.to_ascii_lowercase().as_str())
}

fn normalize_bits(x: f64) -> u64 {
    if x == 0.0 {
        0.0f64.to_bits()
    } else {
        x.to_bits()
    }
}

fn format_label(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        format!("{}", x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_infer_numeric_with_missing() {
        let col = Column::infer("x", &cells(&["1.5", "", "NA", "3"]));
        assert!(col.is_numeric());
        assert!(col.is_missing(1));
        assert!(col.is_missing(2));
        assert!(!col.is_missing(3));
        assert_eq!(col.distinct_count(), 2);
    }

    #[test]
    fn test_infer_text() {
        let col = Column::infer("species", &cells(&["setosa", "1", "virginica"]));
        assert!(!col.is_numeric());
        assert_eq!(col.label_at(0).as_deref(), Some("setosa"));
        assert_eq!(col.label_at(1).as_deref(), Some("1"));
    }

    #[test]
    fn test_label_formatting_merges_integral_floats() {
        let col = Column::numeric("y", vec![Some(1.0), Some(2.5), Some(-0.0)]);
        assert_eq!(col.label_at(0).as_deref(), Some("1"));
        assert_eq!(col.label_at(1).as_deref(), Some("2.5"));
        assert_eq!(col.label_at(2).as_deref(), Some("0"));
    }

    #[test]
    fn test_from_rows_rejects_short_rows() {
        let headers = cells(&["a", "b"]);
        let rows = vec![cells(&["1", "2"]), cells(&["3"])];
        assert!(DataFrame::from_rows(headers, &rows).is_err());
    }

    #[test]
    fn test_without_columns_and_take_rows() {
        let headers = cells(&["id", "x", "y"]);
        let rows = vec![
            cells(&["1", "0.5", "a"]),
            cells(&["2", "0.7", "b"]),
            cells(&["3", "0.9", "a"]),
        ];
        let frame = DataFrame::from_rows(headers, &rows).unwrap();
        assert_eq!(frame.n_rows(), 3);

        let trimmed = frame.without_columns(&["id".to_string()]);
        assert_eq!(trimmed.column_names(), vec!["x", "y"]);
        assert_eq!(frame.n_cols(), 3);

        let subset = frame.take_rows(&[2, 0]);
        assert_eq!(subset.n_rows(), 2);
        assert_eq!(subset.column("y").unwrap().label_at(0).as_deref(), Some("a"));
        assert_eq!(subset.column("id").unwrap().label_at(1).as_deref(), Some("1"));
    }
}
