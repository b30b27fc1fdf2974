//! RESULTADOS and RESUMEN workbook generation.

use std::path::Path;

use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, Worksheet};

use admision_core::model::{Subject, MAX_QUESTIONS};
use admision_core::results::{sort_rows, ResultRow};
use admision_core::summary::SummaryRow;

use crate::error::ReportError;
use crate::reader::{RESULTADOS, RESUMEN};

/// Leading RESULTADOS columns, before the question marks.
pub const RESULTADOS_LEADING: [&str; 16] = [
    "Apellido(s)",
    "Nombre",
    "Dirección de correo",
    "Numero de DNI",
    "Código de Matrícula",
    "Programa Académico",
    "Sede o Filial",
    "Área",
    "Estado",
    "Comenzado el",
    "Finalizado",
    "Tiempo requerido",
    "Calificación/20",
    "_quizid",
    "_courseid",
    "_attemptid",
];

/// Trailing RESULTADOS columns, after the question marks.
pub const RESULTADOS_TRAILING: [&str; 13] = [
    "% COMUNICACIÓN",
    "% HABILIDADES COMUNICATIVAS",
    "% MATEMÁTICA",
    "% CTA/CCSS",
    "P. COMUNICACIÓN",
    "P. HABILIDADES COMUNICATIVAS",
    "P. MATEMÁTICA",
    "P. CTA/CCSS",
    "PUNTAJE",
    "PREGUNTAS RESPONDIDAS",
    "PREGUNTAS NO RESPONDIDAS",
    "%DE PREGUNTAS RESPONDIDAS",
    "%DE PREGUNTAS NO RESPONDIDAS",
];

pub const RESUMEN_COLUMNS: [&str; 32] = [
    "Apellidos y nombres",
    "DNI",
    "Código de Matrícula",
    "Programa Académico",
    "Sede o Filial",
    "Área",
    "Asistencia",
    "COMUNICACIÓN",
    "CRITERIO (COM)",
    "% (COM)",
    "HABILIDADES COMUNICATIVAS",
    "CRITERIO (HAB)",
    "% (HAB)",
    "MATEMÁTICA",
    "CRITERIO (MAT)",
    "% (MAT)",
    "CTA/CCSS",
    "CRITERIO (CTA/CCSS)",
    "% (CTA/CCSS)",
    "TOTAL",
    "%_TOTAL",
    "PREGUNTAS RESPONDIDAS",
    "PREGUNTAS NO RESPONDIDAS",
    "% RESPONDIDAS",
    "% NO RESPONDIDAS",
    "CONDICIÓN",
    "PROGRAMA DE NIVELACIÓN",
    "COMUNICACIÓN.1",
    "HABILIDADES COMUNICATIVAS.1",
    "MATEMATICA",
    "CIENCIA, TECNOLOGÍA Y AMBIENTE.1",
    "CIENCIAS SOCIALES",
];

/// Full RESULTADOS header row.
pub fn resultados_columns() -> Vec<String> {
    RESULTADOS_LEADING
        .iter()
        .map(|s| s.to_string())
        .chain((1..=MAX_QUESTIONS).map(|i| format!("P. {i} /0.2")))
        .chain(RESULTADOS_TRAILING.iter().map(|s| s.to_string()))
        .collect()
}

/// Cell formats shared by the generated sheets.
pub(crate) struct Formats {
    pub header: Format,
    pub percent: Format,
    pub decimal: Format,
    pub text: Format,
}

impl Formats {
    pub fn new() -> Self {
        Self {
            header: Format::new()
                .set_bold()
                .set_align(FormatAlign::Center)
                .set_background_color(0x4472C4)
                .set_font_color(0xFFFFFF)
                .set_border(FormatBorder::Thin),
            percent: Format::new().set_num_format("0.00%"),
            decimal: Format::new().set_num_format("0.00"),
            text: Format::new(),
        }
    }
}

pub(crate) fn write_header(
    worksheet: &mut Worksheet,
    row: u32,
    columns: &[String],
    format: &Format,
) -> Result<(), ReportError> {
    for (col, name) in columns.iter().enumerate() {
        worksheet.write_string_with_format(row, col as u16, name, format)?;
    }
    Ok(())
}

fn write_opt_number(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: Option<f64>,
    format: &Format,
) -> Result<(), ReportError> {
    if let Some(v) = value {
        worksheet.write_number_with_format(row, col, v, format)?;
    }
    Ok(())
}

/// Add the RESULTADOS sheet, one row per attempt.
pub fn add_resultados_sheet(workbook: &mut Workbook, rows: &[ResultRow]) -> Result<(), ReportError> {
    let formats = Formats::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(RESULTADOS)?;
    write_header(worksheet, 0, &resultados_columns(), &formats.header)?;
    worksheet.set_freeze_panes(1, 0)?;

    for (i, r) in rows.iter().enumerate() {
        let row = i as u32 + 1;
        let texts = [
            &r.apellidos,
            &r.nombre,
            &r.correo,
            &r.dni,
            &r.codigo_matricula,
            &r.programa,
            &r.sede,
        ];
        for (col, value) in texts.iter().enumerate() {
            worksheet.write_string(row, col as u16, value.as_str())?;
        }
        worksheet.write_string(row, 7, r.area.to_string())?;
        worksheet.write_string(row, 8, &r.estado)?;
        worksheet.write_string(row, 9, &r.comenzado)?;
        worksheet.write_string(row, 10, &r.finalizado)?;
        worksheet.write_string(row, 11, r.tiempo_requerido())?;
        write_opt_number(worksheet, row, 12, r.calificacion, &formats.decimal)?;
        worksheet.write_number(row, 13, r.quiz_id as f64)?;
        worksheet.write_number(row, 14, r.course_id as f64)?;
        worksheet.write_number(row, 15, r.attempt_id as f64)?;

        let first_question = RESULTADOS_LEADING.len() as u16;
        for (q, value) in r.questions.values().iter().enumerate() {
            write_opt_number(worksheet, row, first_question + q as u16, *value, &formats.text)?;
        }

        let mut col = first_question + MAX_QUESTIONS as u16;
        for subject in Subject::ALL {
            worksheet.write_number_with_format(row, col, r.percent(subject), &formats.percent)?;
            col += 1;
        }
        for subject in Subject::ALL {
            worksheet.write_number_with_format(row, col, r.points(subject), &formats.decimal)?;
            col += 1;
        }
        worksheet.write_number_with_format(row, col, r.scores.puntaje(), &formats.decimal)?;
        worksheet.write_number(row, col + 1, r.scores.responded as f64)?;
        worksheet.write_number(row, col + 2, r.scores.not_responded() as f64)?;
        worksheet.write_number_with_format(row, col + 3, r.scores.responded_fraction(), &formats.percent)?;
        worksheet.write_number_with_format(
            row,
            col + 4,
            r.scores.not_responded_fraction(),
            &formats.percent,
        )?;
    }

    worksheet.set_column_width(0, 24)?;
    worksheet.set_column_width(1, 20)?;
    worksheet.set_column_width(2, 28)?;
    worksheet.set_column_width(5, 28)?;
    Ok(())
}

/// Add the RESUMEN sheet, one row per summarised attempt.
pub fn add_resumen_sheet(workbook: &mut Workbook, rows: &[SummaryRow]) -> Result<(), ReportError> {
    let formats = Formats::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(RESUMEN)?;
    let columns: Vec<String> = RESUMEN_COLUMNS.iter().map(|s| s.to_string()).collect();
    write_header(worksheet, 0, &columns, &formats.header)?;
    worksheet.set_freeze_panes(1, 0)?;

    for (i, r) in rows.iter().enumerate() {
        let row = i as u32 + 1;
        worksheet.write_string(row, 0, &r.apellidos_y_nombres)?;
        worksheet.write_string(row, 1, &r.dni)?;
        worksheet.write_string(row, 2, &r.codigo_matricula)?;
        worksheet.write_string(row, 3, &r.programa)?;
        worksheet.write_string(row, 4, &r.sede)?;
        worksheet.write_string(row, 5, r.area.to_string())?;
        worksheet.write_string(row, 6, &r.asistencia)?;

        let mut col = 7;
        for subject in Subject::ALL {
            let s = r.subject(subject);
            worksheet.write_number_with_format(row, col, s.puntaje, &formats.decimal)?;
            worksheet.write_number(row, col + 1, s.criterio)?;
            worksheet.write_number_with_format(row, col + 2, s.percent, &formats.percent)?;
            col += 3;
        }

        worksheet.write_number_with_format(row, 19, r.total, &formats.decimal)?;
        worksheet.write_number_with_format(row, 20, r.pct_total(), &formats.percent)?;
        worksheet.write_number(row, 21, r.preguntas_respondidas as f64)?;
        worksheet.write_number(row, 22, r.preguntas_no_respondidas as f64)?;
        worksheet.write_number_with_format(row, 23, r.pct_respondidas, &formats.percent)?;
        worksheet.write_number_with_format(row, 24, r.pct_no_respondidas, &formats.percent)?;
        worksheet.write_string(row, 25, &r.condicion)?;
        worksheet.write_string(row, 26, r.programa_nivelacion())?;

        let labels = [
            &r.nivelacion.comunicacion,
            &r.nivelacion.habilidades,
            &r.nivelacion.matematica,
            &r.nivelacion.cta,
            &r.nivelacion.ccss,
        ];
        for (offset, label) in labels.iter().enumerate() {
            if !label.is_empty() {
                worksheet.write_string(row, 27 + offset as u16, label.as_str())?;
            }
        }
    }

    worksheet.set_column_width(0, 36)?;
    worksheet.set_column_width(3, 28)?;
    Ok(())
}

/// Write RESULTADOS and RESUMEN to `path`, creating parent directories.
///
/// Both sheets come out sorted by programa, then DNI, whatever the order of
/// `rows`.
pub fn write_results_workbook(
    path: &Path,
    rows: &[ResultRow],
    summary: &[SummaryRow],
) -> Result<(), ReportError> {
    if rows.is_empty() {
        return Err(ReportError::NoRows);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut sorted = rows.to_vec();
    sort_rows(&mut sorted);

    let mut workbook = Workbook::new();
    add_resultados_sheet(&mut workbook, &sorted)?;
    add_resumen_sheet(&mut workbook, summary)?;
    workbook.save(path)?;

    tracing::info!(
        path = %path.display(),
        resultados = rows.len(),
        resumen = summary.len(),
        "workbook written"
    );
    Ok(())
}
