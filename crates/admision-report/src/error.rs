//! Report error types.

use thiserror::Error;

/// Errors raised while reading or writing workbooks.
#[derive(Debug, Error)]
pub enum ReportError {
    /// There is nothing to write.
    #[error("no result rows to export")]
    NoRows,

    /// A required sheet is absent from the input workbook.
    #[error("sheet '{sheet}' not found (sheets: {})", found.join(", "))]
    MissingSheet { sheet: String, found: Vec<String> },

    /// A required column could not be matched in a sheet header.
    #[error("{sheet} has no '{column}' column")]
    MissingColumn { sheet: String, column: String },

    /// The input workbook could not be opened or parsed.
    #[error("failed to read workbook {path}: {message}")]
    Read { path: String, message: String },

    /// The output workbook could not be produced.
    #[error("failed to write workbook: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
