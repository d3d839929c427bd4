//! This module provides utilities for loading point sets from files.
//!
//! A point file holds one point per line, coordinates separated by whitespace or commas.
//! Blank lines and lines starting with `#` are skipped. Every point must have the same
//! number of coordinates.

use faer::Mat;
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};
use thiserror::Error;

/// Represents all possible errors that can occur while loading a point file.
#[derive(Error, Debug)]
pub enum DataLoaderError {
    /// Wraps a standard I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Occurs when a coordinate cannot be parsed into a float.
    #[error("Parse error on line {line}: failed to parse float from '{value}'")]
    ParseFloat { line: usize, value: String },
    /// Occurs when a point has a different number of coordinates than the first one.
    #[error("Format error on line {line}: expected {expected} coordinates, found {found}.")]
    RaggedRow {
        line: usize,
        expected: usize,
        found: usize,
    },
    /// Occurs when the file contains no points.
    #[error("Format error: the file contains no points.")]
    Empty,
}

/// Parses points from any buffered reader. Line numbers in errors are 1-based.
pub fn read_points(reader: impl BufRead) -> Result<Mat<f64>, DataLoaderError> {
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let row = trimmed
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|field| !field.is_empty())
            .map(|field| {
                field.parse::<f64>().map_err(|_| DataLoaderError::ParseFloat {
                    line: idx + 1,
                    value: field.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(first) = rows.first() {
            if row.len() != first.len() {
                return Err(DataLoaderError::RaggedRow {
                    line: idx + 1,
                    expected: first.len(),
                    found: row.len(),
                });
            }
        }
        rows.push(row);
    }

    let dim = rows.first().map(Vec::len).ok_or(DataLoaderError::Empty)?;
    Ok(Mat::from_fn(rows.len(), dim, |i, k| rows[i][k]))
}

/// Loads an `N x dim` matrix of points from the file at `path`.
pub fn load_points(path: impl AsRef<Path>) -> Result<Mat<f64>, DataLoaderError> {
    let file = File::open(path)?;
    read_points(BufReader::new(file))
}
