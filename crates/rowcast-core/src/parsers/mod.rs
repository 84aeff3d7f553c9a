//! File format parsers for linear systems.
//!
//! Supported formats:
//! - [`.sys` / `.txt`](text): plain-text augmented matrix
//! - [`.json`](json): JSON object with `matrix` and `rhs`

pub mod json;
pub mod text;

use std::path::Path;

use ndarray::{Array1, Array2};
use thiserror::Error;

use crate::types::LinearSystem;

/// Errors during system file parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    FormatError { line: usize, message: String },

    #[error("Invalid JSON system: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid system: {0}")]
    InvalidSystem(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
}

/// Load a system from `path`, choosing the parser by file extension.
pub fn load_system(path: &Path) -> Result<LinearSystem, ParseError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "sys" | "txt" => text::parse_text(&std::fs::read_to_string(path)?),
        "json" => json::parse_json(&std::fs::read_to_string(path)?),
        other => Err(ParseError::UnsupportedFormat(if other.is_empty() {
            path.display().to_string()
        } else {
            format!(".{}", other)
        })),
    }
}

/// Assemble a square system from row vectors, checking every row has `n`
/// coefficients and the right-hand side has `n` entries.
pub(crate) fn system_from_rows(
    rows: Vec<Vec<f64>>,
    rhs: Vec<f64>,
) -> Result<LinearSystem, ParseError> {
    let n = rhs.len();
    if rows.len() != n {
        return Err(ParseError::InvalidSystem(format!(
            "{} matrix rows for {} right-hand side entries",
            rows.len(),
            n
        )));
    }
    if let Some((i, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != n) {
        return Err(ParseError::InvalidSystem(format!(
            "row {} has {} coefficients, expected {}",
            i,
            row.len(),
            n
        )));
    }

    // Rows are validated, so this never exceeds the input already held.
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    let matrix = Array2::from_shape_vec((n, n), flat)
        .map_err(|e| ParseError::InvalidSystem(e.to_string()))?;
    Ok(LinearSystem::new(matrix, Array1::from_vec(rhs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();

        let text_path = dir.path().join("a.sys");
        let mut f = std::fs::File::create(&text_path).unwrap();
        writeln!(f, "1\ncomment\n2.0 4.0").unwrap();
        let system = load_system(&text_path).unwrap();
        assert_eq!(system.rhs[0], 4.0);

        let json_path = dir.path().join("a.JSON");
        std::fs::write(&json_path, r#"{"matrix": [[3.0]], "rhs": [6.0]}"#).unwrap();
        let system = load_system(&json_path).unwrap();
        assert_eq!(system.matrix[[0, 0]], 3.0);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let err = load_system(Path::new("system.csv")).unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedFormat(ref ext) if ext == ".csv"));
    }

    #[test]
    fn test_short_rows_rejected_without_reserving_square() {
        let n = 200_000;
        let err = system_from_rows(vec![Vec::new(); n], vec![0.0; n]).unwrap_err();
        assert!(matches!(err, ParseError::InvalidSystem(ref msg) if msg.starts_with("row 0 ")));
    }

    #[test]
    fn test_structural_error_has_no_line_number() {
        let err = system_from_rows(vec![vec![1.0]], vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, ParseError::InvalidSystem(_)));
        assert!(!err.to_string().contains("line"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_system(Path::new("/nonexistent/rowcast/system.sys")).unwrap_err();
        assert!(matches!(err, ParseError::IoError(_)));
    }
}
