//! Parser for JSON system files.
//!
//! ```json
//! { "matrix": [[4.0, 1.0], [1.0, 3.0]], "rhs": [1.0, 2.0] }
//! ```

use serde::Deserialize;

use super::{system_from_rows, ParseError};
use crate::types::LinearSystem;

#[derive(Debug, Deserialize)]
struct SystemFile {
    matrix: Vec<Vec<f64>>,
    rhs: Vec<f64>,
}

/// Parse a JSON system from a string.
pub fn parse_json(content: &str) -> Result<LinearSystem, ParseError> {
    let file: SystemFile = serde_json::from_str(content)?;
    system_from_rows(file.matrix, file.rhs)
}
