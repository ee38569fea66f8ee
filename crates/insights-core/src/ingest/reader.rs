//! Raw table readers: first worksheet of a workbook, or a CSV file.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};

use super::IngestError;

/// Source formats accepted by the ingester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Workbook,
    Csv,
}

impl SourceFormat {
    /// Case-insensitive match on the file extension.
    pub fn detect(path: &Path) -> Result<Self, IngestError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "xlsx" | "xlsm" | "xls" => Ok(SourceFormat::Workbook),
            "csv" => Ok(SourceFormat::Csv),
            _ => Err(IngestError::UnsupportedExtension { extension }),
        }
    }
}

/// All rows of the source as trimmed strings, header row included.
///
/// Returns the sheet name alongside for workbooks.
pub fn read_table(path: &Path) -> Result<(Vec<Vec<String>>, Option<String>), IngestError> {
    match SourceFormat::detect(path)? {
        SourceFormat::Workbook => read_workbook(path).map(|(rows, sheet)| (rows, Some(sheet))),
        SourceFormat::Csv => read_csv(path).map(|rows| (rows, None)),
    }
}

fn read_workbook(path: &Path) -> Result<(Vec<Vec<String>>, String), IngestError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| IngestError::read(path, e))?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| IngestError::EmptyFile {
            path: path.to_path_buf(),
        })?;
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| IngestError::read(path, e))?;

    let rows = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect();
    Ok((rows, sheet))
}

fn read_csv(path: &Path) -> Result<Vec<Vec<String>>, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| IngestError::read(path, e))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| IngestError::read(path, e))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

/// Render a cell as text; whole floats lose their `.0` so NPS cells read as `9`.
pub fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Empty | Data::Error(_) => String::new(),
        other => other.to_string().trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_is_case_insensitive() {
        assert_eq!(
            SourceFormat::detect(Path::new("survey.XLSX")).unwrap(),
            SourceFormat::Workbook
        );
        assert_eq!(
            SourceFormat::detect(Path::new("survey.Csv")).unwrap(),
            SourceFormat::Csv
        );
    }

    #[test]
    fn test_detect_rejects_unknown() {
        let err = SourceFormat::detect(Path::new("notes.txt")).unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedExtension { ref extension } if extension == "txt"));
        assert!(SourceFormat::detect(Path::new("no_extension")).is_err());
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Data::Float(9.0)), "9");
        assert_eq!(cell_text(&Data::Float(7.5)), "7.5");
        assert_eq!(cell_text(&Data::Int(3)), "3");
        assert_eq!(cell_text(&Data::String("  hola ".into())), "hola");
        assert_eq!(cell_text(&Data::Empty), "");
    }
}
