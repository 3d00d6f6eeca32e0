//! Raw spreadsheet access: CSV exports read as rows of typed cells.
//!
//! The source workbook has no reliable header row, so nothing here knows
//! about column meaning; see [`super::schema`] for that.

use crate::error::MlError;
use std::path::Path;

/// Tokens a spreadsheet export writes for a missing value.
const MISSING_TOKENS: &[&str] = &["nan", "na", "n/a", "#n/a", "null", "none"];

/// A single spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    /// Interpret raw cell text the way a spreadsheet reader would.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || MISSING_TOKENS
                .iter()
                .any(|t| trimmed.eq_ignore_ascii_case(t))
        {
            return Self::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(value) => Self::Number(value),
            Err(_) => Self::Text(trimmed.to_string()),
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A sheet: rows of cells, rows may differ in length.
pub type Sheet = Vec<Vec<Cell>>;

/// Read a CSV export from disk.
pub fn read_sheet(path: &Path) -> Result<Sheet, MlError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        MlError::dataset(format!("Failed to read sheet {}: {e}", path.display()))
    })?;
    Ok(parse_sheet(&content))
}

/// Parse CSV text into cells.
///
/// Double-quoted fields may contain commas, line breaks, and `""` escapes.
/// Blank lines become empty rows so that row numbering matches the file.
pub fn parse_sheet(content: &str) -> Sheet {
    let mut rows = Vec::new();
    let mut row: Vec<Cell> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => row.push(Cell::parse(&std::mem::take(&mut field))),
            '\r' => {}
            '\n' => {
                row.push(Cell::parse(&std::mem::take(&mut field)));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(Cell::parse(&field));
        rows.push(row);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_parse_kinds() {
        assert_eq!(Cell::parse("  "), Cell::Empty);
        assert_eq!(Cell::parse("NaN"), Cell::Empty);
        assert_eq!(Cell::parse("12.5"), Cell::Number(12.5));
        assert_eq!(Cell::parse(" 3 "), Cell::Number(3.0));
        assert_eq!(Cell::parse("Laterite"), Cell::Text("Laterite".into()));
        assert_eq!(Cell::parse("inf"), Cell::Number(f64::INFINITY));
    }

    #[test]
    fn test_parse_sheet_ragged_rows() {
        let sheet = parse_sheet("a,1,2\n\nb,3\n");
        assert_eq!(sheet.len(), 3);
        assert_eq!(sheet[0].len(), 3);
        assert_eq!(sheet[1], vec![Cell::Empty]);
        assert_eq!(sheet[2], vec![Cell::Text("b".into()), Cell::Number(3.0)]);
    }

    #[test]
    fn test_parse_sheet_quoted_fields() {
        let sheet = parse_sheet("\"Clay, red\",\"say \"\"hi\"\"\",4\r\nlast,5");
        assert_eq!(sheet.len(), 2);
        assert_eq!(sheet[0][0], Cell::Text("Clay, red".into()));
        assert_eq!(sheet[0][1], Cell::Text("say \"hi\"".into()));
        assert_eq!(sheet[0][2], Cell::Number(4.0));
        assert_eq!(sheet[1][1], Cell::Number(5.0));
    }

    #[test]
    fn test_read_sheet_missing_file() {
        let err = read_sheet(Path::new("/nonexistent/sheet.csv")).unwrap_err();
        assert!(matches!(err, MlError::Dataset(_)));
    }
}
