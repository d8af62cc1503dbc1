//! Data loading utilities

use crate::error::{BakeoffError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use std::time::Instant;
use tracing::debug;

/// Features and encoded labels extracted from a DataFrame
#[derive(Debug, Clone)]
pub struct LabeledArrays {
    pub x: Array2<f64>,
    /// Class indices `0..n_classes`, named by `target_names`
    pub y: Array1<f64>,
    pub feature_names: Vec<String>,
    pub target_names: Vec<String>,
}

/// CSV loader built on polars
pub struct DataLoader {
    /// Rows used for schema inference
    infer_schema_length: usize,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    /// Create a new data loader
    pub fn new() -> Self {
        Self {
            infer_schema_length: 100,
        }
    }

    /// Set the number of rows used to infer column types
    pub fn with_infer_schema_length(mut self, rows: usize) -> Self {
        self.infer_schema_length = rows;
        self
    }

    /// Load a CSV file with a header row
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let start = Instant::now();
        let file = File::open(path).map_err(|e| {
            BakeoffError::DataError(format!("Cannot open {}: {}", path.display(), e))
        })?;

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(self.infer_schema_length))
            .into_reader_with_file_handle(file)
            .finish()?;

        debug!(
            path = %path.display(),
            rows = df.height(),
            cols = df.width(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "CSV loaded"
        );
        Ok(df)
    }

    /// Parse CSV text held in memory
    pub fn load_csv_str(&self, content: &'static str) -> Result<DataFrame> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(self.infer_schema_length))
            .into_reader_with_file_handle(Cursor::new(content.as_bytes()))
            .finish()?;
        Ok(df)
    }
}

fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int32
            | DataType::Int64
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

fn column_to_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = df
        .column(name)
        .map_err(|_| BakeoffError::FeatureNotFound(name.to_string()))?;
    if !is_numeric(column.dtype()) {
        return Err(BakeoffError::DataError(format!(
            "Column '{}' is not numeric ({})",
            name,
            column.dtype()
        )));
    }

    let casted = column.cast(&DataType::Float64)?;
    casted
        .f64()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.ok_or_else(|| {
                BakeoffError::DataError(format!("Missing value in column '{}' at row {}", name, row))
            })
        })
        .collect()
}

/// Split a DataFrame into a feature matrix and encoded labels
///
/// Every column other than `target_column` is a feature and must be numeric.
/// String labels are encoded in order of first appearance. Numeric labels are
/// encoded by their rank among the sorted distinct values and named by them.
pub fn frame_to_arrays(df: &DataFrame, target_column: &str) -> Result<LabeledArrays> {
    let target = df
        .column(target_column)
        .map_err(|_| BakeoffError::FeatureNotFound(target_column.to_string()))?;

    let feature_names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .filter(|name| name.as_str() != target_column)
        .map(|s| s.to_string())
        .collect();
    if feature_names.is_empty() {
        return Err(BakeoffError::DataError(
            "Dataset has no feature columns".to_string(),
        ));
    }

    let (y, target_names) = if is_numeric(target.dtype()) {
        let values = column_to_f64(df, target_column)?;
        let mut distinct = values.clone();
        distinct.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        distinct.dedup();
        let encoded: Vec<f64> = values
            .iter()
            .map(|v| distinct.partition_point(|d| d < v) as f64)
            .collect();
        let names: Vec<String> = distinct.iter().map(|v| v.to_string()).collect();
        (encoded, names)
    } else {
        let labels = target.str()?;
        let mut names: Vec<String> = Vec::new();
        let mut encoded = Vec::with_capacity(labels.len());
        for (row, label) in labels.into_iter().enumerate() {
            let label = label.ok_or_else(|| {
                BakeoffError::DataError(format!(
                    "Missing label in column '{}' at row {}",
                    target_column, row
                ))
            })?;
            let idx = match names.iter().position(|n| n == label) {
                Some(i) => i,
                None => {
                    names.push(label.to_string());
                    names.len() - 1
                }
            };
            encoded.push(idx as f64);
        }
        (encoded, names)
    };
    let y = Array1::from_vec(y);

    let columns: Vec<Vec<f64>> = feature_names
        .iter()
        .map(|name| column_to_f64(df, name))
        .collect::<Result<_>>()?;

    let n_rows = df.height();
    let x = Array2::from_shape_fn((n_rows, columns.len()), |(r, c)| columns[c][r]);

    Ok(LabeledArrays {
        x,
        y,
        feature_names,
        target_names,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_string_labels_first_appearance() {
        let csv = "a,b,label\n1.0,2,cat\n3.5,4,dog\n5.0,6,cat\n7.0,8,bird\n";
        let df = DataLoader::new().load_csv_str(csv).unwrap();
        let arrays = frame_to_arrays(&df, "label").unwrap();

        assert_eq!(arrays.feature_names, vec!["a", "b"]);
        assert_eq!(arrays.target_names, vec!["cat", "dog", "bird"]);
        assert_eq!(arrays.y.to_vec(), vec![0.0, 1.0, 0.0, 2.0]);
        assert_eq!(arrays.x.dim(), (4, 2));
        assert_eq!(arrays.x[[1, 0]], 3.5);
        assert_eq!(arrays.x[[3, 1]], 8.0);
    }

    #[test]
    fn test_numeric_labels() {
        let csv = "x,y\n0.5,1\n0.7,0\n0.9,1\n";
        let df = DataLoader::new().load_csv_str(csv).unwrap();
        let arrays = frame_to_arrays(&df, "y").unwrap();

        assert_eq!(arrays.y.to_vec(), vec![1.0, 0.0, 1.0]);
        assert_eq!(arrays.target_names, vec!["0", "1"]);
    }

    #[test]
    fn test_fractional_and_sparse_numeric_labels_are_encoded() {
        let csv = "x,y\n0.5,0.2\n0.7,0.1\n0.9,0.2\n1.1,7\n";
        let df = DataLoader::new().load_csv_str(csv).unwrap();
        let arrays = frame_to_arrays(&df, "y").unwrap();

        assert_eq!(arrays.y.to_vec(), vec![1.0, 0.0, 1.0, 2.0]);
        assert_eq!(arrays.target_names, vec!["0.1", "0.2", "7"]);
    }

    #[test]
    fn test_missing_target_column() {
        let csv = "x,y\n0.5,1\n";
        let df = DataLoader::new().load_csv_str(csv).unwrap();
        assert!(matches!(
            frame_to_arrays(&df, "species"),
            Err(BakeoffError::FeatureNotFound(_))
        ));
    }

    #[test]
    fn test_non_numeric_feature() {
        let csv = "x,color,y\n0.5,red,1\n0.6,blue,0\n";
        let df = DataLoader::new().load_csv_str(csv).unwrap();
        assert!(matches!(
            frame_to_arrays(&df, "y"),
            Err(BakeoffError::DataError(_))
        ));
    }

    #[test]
    fn test_load_csv_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "f1,f2,target").unwrap();
        writeln!(file, "1.0,2.0,a").unwrap();
        writeln!(file, "3.0,4.0,b").unwrap();

        let df = DataLoader::new().load_csv(file.path()).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 3);
    }

    #[test]
    fn test_load_csv_missing_file() {
        let result = DataLoader::new().load_csv("/definitely/not/here.csv");
        assert!(matches!(result, Err(BakeoffError::DataError(_))));
    }
}
