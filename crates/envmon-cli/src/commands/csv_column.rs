//! Read one numeric column out of a CSV export.
//!
//! The first record is the header; the column is matched by name,
//! case-insensitive. Blank cells and short rows are skipped. Quoted cells may
//! carry embedded commas.

use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug)]
pub enum CsvColumnError {
    Io(String),
    MissingColumn(String),
    ParseCell { row: usize, raw: String },
}

impl fmt::Display for CsvColumnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CsvColumnError::Io(msg) => write!(f, "csv io error: {msg}"),
            CsvColumnError::MissingColumn(col) => {
                write!(f, "csv has no column named '{col}'")
            }
            CsvColumnError::ParseCell { row, raw } => {
                write!(f, "csv row {row}: '{raw}' is not a number")
            }
        }
    }
}

impl std::error::Error for CsvColumnError {}

impl From<csv::Error> for CsvColumnError {
    fn from(e: csv::Error) -> Self {
        CsvColumnError::Io(e.to_string())
    }
}

pub fn read_column_file(path: &Path, column: &str) -> Result<Vec<f64>, CsvColumnError> {
    let text = fs::read_to_string(path)
        .map_err(|e| CsvColumnError::Io(format!("{}: {e}", path.display())))?;
    read_column_str(&text, column)
}

pub fn read_column_str(text: &str, column: &str) -> Result<Vec<f64>, CsvColumnError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let wanted = column.trim().to_ascii_lowercase();
    let idx = rdr
        .headers()?
        .iter()
        .position(|h| h.to_ascii_lowercase() == wanted)
        .ok_or_else(|| CsvColumnError::MissingColumn(column.to_string()))?;

    let mut out = Vec::new();
    // Row numbers are 1-based data rows, header excluded.
    for (i, rec) in rdr.records().enumerate() {
        let rec = rec?;
        let cell = rec.get(idx).unwrap_or("");
        if cell.is_empty() {
            continue;
        }
        let v: f64 = cell.parse().map_err(|_| CsvColumnError::ParseCell {
            row: i + 1,
            raw: cell.to_string(),
        })?;
        out.push(v);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = "Row,CO2 Level (ppm),Notes\n\
                          row-1,450,ok\n\
                          row-2,\"520.5\",\n\
                          row-3,,pending\n\
                          \n\
                          row-4,380,\n";

    #[test]
    fn header_match_is_case_insensitive() {
        let v = read_column_str(EXPORT, "co2 level (PPM)").unwrap();
        assert_eq!(v, vec![450.0, 520.5, 380.0]);
    }

    #[test]
    fn missing_column_names_the_column() {
        let err = read_column_str(EXPORT, "Temperature").unwrap_err();
        assert_eq!(err.to_string(), "csv has no column named 'Temperature'");
    }

    #[test]
    fn non_numeric_cell_reports_row() {
        let err = read_column_str(EXPORT, "Notes").unwrap_err();
        match err {
            CsvColumnError::ParseCell { row, raw } => {
                assert_eq!(row, 1);
                assert_eq!(raw, "ok");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_input_has_no_header() {
        assert!(matches!(
            read_column_str("", "x"),
            Err(CsvColumnError::MissingColumn(_))
        ));
    }

    #[test]
    fn quoted_cells_keep_embedded_commas() {
        let text = "Location,CO2\n\"Block A, North\",450\nBlock B,520\n";
        assert_eq!(read_column_str(text, "CO2").unwrap(), vec![450.0, 520.0]);
        let err = read_column_str(text, "Location").unwrap_err();
        match err {
            CsvColumnError::ParseCell { row, raw } => {
                assert_eq!(row, 1);
                assert_eq!(raw, "Block A, North");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bom_is_stripped() {
        let v = read_column_str("\u{feff}value\n1\n2\n", "value").unwrap();
        assert_eq!(v, vec![1.0, 2.0]);
    }
}
