//! Reading RESULTADOS/RESUMEN workbooks back with calamine.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};

use crate::error::ReportError;
use crate::headers::HeaderIndex;

pub const RESULTADOS: &str = "RESULTADOS";
pub const RESUMEN: &str = "RESUMEN";

/// A cell value reduced to what the reports need.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
}

static EMPTY: CellValue = CellValue::Empty;

impl CellValue {
    pub fn from_data(data: &Data) -> Self {
        match data {
            Data::String(s) if s.trim().is_empty() => CellValue::Empty,
            Data::String(s) => CellValue::Text(s.trim().to_string()),
            Data::Float(f) => CellValue::Number(*f),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Bool(b) => CellValue::Text(b.to_string()),
            Data::Empty | Data::Error(_) => CellValue::Empty,
            Data::DateTime(d) => CellValue::Text(d.to_string()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        }
    }

    /// Text rendering; whole numbers print without a decimal part.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(f) => {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    format!("{}", *f as i64)
                } else {
                    format!("{f}")
                }
            }
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(f) => Some(*f),
            CellValue::Text(s) => s.replace(',', ".").parse().ok(),
            CellValue::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

/// One worksheet: the first row as headers, the rest as values.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Sheet {
    pub fn header_index(&self) -> HeaderIndex {
        HeaderIndex::new(&self.headers)
    }

    /// Cell at (row, col); missing cells read as empty.
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn read_error(path: &Path, e: impl std::fmt::Display) -> ReportError {
    ReportError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

/// Names of every sheet in a workbook.
pub fn sheet_names(path: &Path) -> Result<Vec<String>, ReportError> {
    let workbook = open_workbook_auto(path).map_err(|e| read_error(path, e))?;
    Ok(workbook.sheet_names().to_owned())
}

/// Read one sheet by name, taking its first row as the header.
pub fn read_sheet(path: &Path, name: &str) -> Result<Sheet, ReportError> {
    read_sheet_with_header(path, name, 0)
}

/// Read one sheet whose header sits on `header_row` (0-based). Rows above
/// it are skipped.
pub fn read_sheet_with_header(
    path: &Path,
    name: &str,
    header_row: usize,
) -> Result<Sheet, ReportError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| read_error(path, e))?;
    let names = workbook.sheet_names().to_owned();
    if !names.iter().any(|n| n == name) {
        return Err(ReportError::MissingSheet {
            sheet: name.to_string(),
            found: names,
        });
    }
    let range = workbook
        .worksheet_range(name)
        .map_err(|e| read_error(path, e))?;

    // calamine ranges start at the first used cell, not at A1.
    let (first_row, first_col) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));
    let to_cells = |r: &[Data]| {
        std::iter::repeat(CellValue::Empty)
            .take(first_col)
            .chain(r.iter().map(CellValue::from_data))
            .collect::<Vec<_>>()
    };

    let mut rows = range.rows().skip(header_row.saturating_sub(first_row));
    let headers: Vec<String> = rows
        .next()
        .map(|r| to_cells(r).iter().map(CellValue::as_text).collect())
        .unwrap_or_default();
    let rows = rows
        .map(to_cells)
        .filter(|r| r.iter().any(|c| !c.is_empty()))
        .collect();

    Ok(Sheet {
        name: name.to_string(),
        headers,
        rows,
    })
}

/// A workbook produced by the export: its RESULTADOS and RESUMEN sheets.
#[derive(Debug, Clone)]
pub struct SourceWorkbook {
    pub resultados: Sheet,
    pub resumen: Sheet,
}

impl SourceWorkbook {
    /// Open a workbook that must carry both RESULTADOS and RESUMEN.
    pub fn open(path: &Path) -> Result<Self, ReportError> {
        let names = sheet_names(path)?;
        for required in [RESULTADOS, RESUMEN] {
            if !names.iter().any(|n| n == required) {
                return Err(ReportError::MissingSheet {
                    sheet: required.to_string(),
                    found: names,
                });
            }
        }
        tracing::debug!(path = %path.display(), "reading source workbook");
        Ok(Self {
            resultados: read_sheet(path, RESULTADOS)?,
            resumen: read_sheet(path, RESUMEN)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    #[test]
    fn cell_text_rendering() {
        assert_eq!(CellValue::Number(12345678.0).as_text(), "12345678");
        assert_eq!(CellValue::Number(0.25).as_text(), "0.25");
        assert_eq!(CellValue::Text("x".into()).as_text(), "x");
        assert_eq!(CellValue::Empty.as_text(), "");
        assert_eq!(CellValue::Text("0,5".into()).as_f64(), Some(0.5));
        assert_eq!(
            CellValue::from_data(&Data::String("  ".into())),
            CellValue::Empty
        );
        assert_eq!(CellValue::from_data(&Data::Int(7)), CellValue::Number(7.0));
    }

    #[test]
    fn reads_back_written_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.xlsx");

        let mut workbook = Workbook::new();
        let ws = workbook.add_worksheet();
        ws.set_name("RESUMEN").unwrap();
        ws.write_string(0, 0, "DNI").unwrap();
        ws.write_string(0, 1, "TOTAL").unwrap();
        ws.write_number(1, 0, 1234567.0).unwrap();
        ws.write_number(1, 1, 55.5).unwrap();
        ws.write_string(2, 0, "87654321").unwrap();
        workbook.save(&path).unwrap();

        let sheet = read_sheet(&path, "RESUMEN").unwrap();
        assert_eq!(sheet.headers, vec!["DNI", "TOTAL"]);
        assert_eq!(sheet.len(), 2);
        assert_eq!(sheet.cell(0, 0).as_text(), "1234567");
        assert_eq!(sheet.cell(0, 1).as_f64(), Some(55.5));
        assert!(sheet.cell(1, 1).is_empty());
        assert!(sheet.cell(9, 9).is_empty());
    }

    #[test]
    fn source_workbook_requires_both_sheets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("only_resultados.xlsx");

        let mut workbook = Workbook::new();
        workbook
            .add_worksheet()
            .set_name("RESULTADOS")
            .unwrap()
            .write_string(0, 0, "Numero de DNI")
            .unwrap();
        workbook.save(&path).unwrap();

        let err = SourceWorkbook::open(&path).unwrap_err();
        match err {
            ReportError::MissingSheet { sheet, found } => {
                assert_eq!(sheet, "RESUMEN");
                assert_eq!(found, vec!["RESULTADOS"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = read_sheet(Path::new("/nonexistent/book.xlsx"), "RESUMEN").unwrap_err();
        assert!(matches!(err, ReportError::Read { .. }));
    }
}
