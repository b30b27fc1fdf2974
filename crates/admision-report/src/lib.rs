//! admision-report: Excel output for admission exam exports.
//!
//! Writes the RESULTADOS/RESUMEN workbook, reads it back with tolerant
//! header matching, and renders Acta Final / Consolidado sheets per sede.

pub mod actas;
pub mod error;
pub mod headers;
pub mod reader;
pub mod workbook;

pub use actas::{write_actas, ActasOptions, ActasOutcome};
pub use error::ReportError;
pub use reader::SourceWorkbook;
pub use workbook::write_results_workbook;
