//! The `admision actas` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use admision_core::window::parse_date;
use admision_moodle::load_config_from;
use admision_report::{write_actas, ActasOptions, SourceWorkbook};

use super::split_list;

pub fn execute(
    input: PathBuf,
    date: String,
    output: Option<PathBuf>,
    exam_label: Option<String>,
    sedes: Option<String>,
    no_source_sheets: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let exam_date = parse_date(&date)?;

    anyhow::ensure!(input.exists(), "input workbook not found: {}", input.display());
    let source = SourceWorkbook::open(&input)
        .with_context(|| format!("failed to read {}", input.display()))?;

    let options = ActasOptions {
        exam_label: exam_label.unwrap_or_else(|| config.actas.exam_label.clone()),
        sedes: sedes
            .as_deref()
            .map(split_list)
            .unwrap_or_else(|| config.actas.sedes.clone()),
        include_source_sheets: config.actas.include_source_sheets && !no_source_sheets,
        ..ActasOptions::new(exam_date)
    };

    let output = output.unwrap_or_else(|| default_output(&input));
    let outcome = write_actas(&output, &source, &options)
        .with_context(|| format!("failed to write {}", output.display()))?;

    for (sheet, rows) in &outcome.sheets {
        println!("  {sheet}: {rows} row(s)");
    }
    println!("Actas written: {}", output.display());
    Ok(())
}

/// `ACTAS_<input file name>` next to the input.
fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "RESULTADOS".to_string());
    input.with_file_name(format!("ACTAS_{stem}.xlsx"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_sits_next_to_input() {
        assert_eq!(
            default_output(Path::new("/data/RESULTADOS_ADMISION_2025-03-09.xlsx")),
            PathBuf::from("/data/ACTAS_RESULTADOS_ADMISION_2025-03-09.xlsx")
        );
    }
}
