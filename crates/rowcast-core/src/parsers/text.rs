//! Parser for plain-text augmented-matrix files.
//!
//! The format is:
//! ```text
//! <n>
//! <comment line>
//! <a_00> <a_01> ... <a_0(n-1)> <b_0>
//! ...
//! <a_(n-1)0> ...        <b_(n-1)>
//! ```
//!
//! Values are whitespace separated. Blank lines after the comment are
//! skipped. Each row carries its $n$ coefficients followed by the
//! right-hand side entry.

use super::{system_from_rows, ParseError};
use crate::types::LinearSystem;

/// Parse a text system from a string.
pub fn parse_text(content: &str) -> Result<LinearSystem, ParseError> {
    let lines: Vec<&str> = content.lines().collect();

    if lines.len() < 2 {
        return Err(ParseError::FormatError {
            line: 1,
            message: "system file must have a dimension line and a comment line".into(),
        });
    }

    let n: usize = lines[0].trim().parse().map_err(|_| ParseError::FormatError {
        line: 1,
        message: "First line must be the system dimension".into(),
    })?;

    let width = n.checked_add(1).ok_or_else(|| ParseError::FormatError {
        line: 1,
        message: format!("System dimension {} is too large", n),
    })?;

    // Line 2 is the comment line (ignored)

    // The header is not trusted for sizing; rows are counted as they arrive.
    let mut rows = Vec::new();
    let mut rhs = Vec::new();
    for (idx, line) in lines[2..].iter().enumerate() {
        let line_no = idx + 3;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let values = line
            .split_whitespace()
            .map(|token| {
                token.parse::<f64>().map_err(|_| ParseError::FormatError {
                    line: line_no,
                    message: format!("Invalid number: {}", token),
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;

        if values.len() != width {
            return Err(ParseError::FormatError {
                line: line_no,
                message: format!(
                    "Expected {} coefficients and a right-hand side, got {} values",
                    n,
                    values.len()
                ),
            });
        }

        let mut row = values;
        if let Some(b) = row.pop() {
            rhs.push(b);
        }
        rows.push(row);
    }

    if rows.len() != n {
        return Err(ParseError::FormatError {
            line: 1,
            message: format!("Header says {} rows but found {}", n, rows.len()),
        });
    }

    system_from_rows(rows, rhs)
}
