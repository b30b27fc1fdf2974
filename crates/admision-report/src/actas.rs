//! Acta Final and Consolidado sheets, one pair per sede.
//!
//! Input is a workbook produced by the export (RESULTADOS + RESUMEN). Every
//! RESUMEN row is enriched with the contact data of the first RESULTADOS
//! row holding the same normalised DNI, grouped by sede and laid out in a
//! fixed acta layout.

use std::collections::HashMap;
use std::path::Path;

use chrono::{Datelike, NaiveDate};
use rust_xlsxwriter::{ExcelDateTime, Format, FormatAlign, FormatBorder, Workbook, Worksheet};

use crate::error::ReportError;
use crate::reader::{CellValue, Sheet, SourceWorkbook, RESULTADOS, RESUMEN};
use crate::workbook::{write_header, Formats, RESUMEN_COLUMNS};

pub const DEFAULT_EXAM_LABEL: &str = "EXAMEN ORDINARIO";
pub const DEFAULT_SEDES: [&str; 2] = ["CHINCHA", "ICA"];

/// Zero-based row of the column header in acta sheets.
pub const HEADER_ROW: u32 = 3;

pub static ACTA_COLUMNS: [&str; 26] = [
    "N°",
    "APELLIDOS",
    "NOMBRES",
    "DNI",
    "CODIGO",
    "TELEFONO",
    "CORREO",
    "AREA",
    "CARRERA",
    "SEDE DE ESTUDIO",
    "ASISTENCIA",
    "COM",
    "%COM",
    "HAB",
    "%HAB",
    "MAT",
    "%MAT",
    "CTA",
    "%CTA",
    "TOTAL",
    "%TOTAL",
    "CONDICIÓN",
    "MODALIDAD",
    "FECHA",
    "EXAMEN",
    "MODALIDAD DE INGRESO",
];

/// RESUMEN columns copied into COM..%TOTAL, in acta order.
const SCORE_COLUMNS: [&str; 10] = [
    "COMUNICACIÓN",
    "% (COM)",
    "HABILIDADES COMUNICATIVAS",
    "% (HAB)",
    "MATEMÁTICA",
    "% (MAT)",
    "CTA/CCSS",
    "% (CTA/CCSS)",
    "TOTAL",
    "%_TOTAL",
];

/// Options for rendering actas.
#[derive(Debug, Clone)]
pub struct ActasOptions {
    pub exam_date: NaiveDate,
    pub exam_label: String,
    /// Sede keys in match priority order; the first one is the fallback.
    pub sedes: Vec<String>,
    /// Put copies of RESULTADOS and RESUMEN in front of the acta sheets.
    pub include_source_sheets: bool,
}

impl ActasOptions {
    pub fn new(exam_date: NaiveDate) -> Self {
        Self {
            exam_date,
            exam_label: DEFAULT_EXAM_LABEL.to_string(),
            sedes: DEFAULT_SEDES.iter().map(|s| s.to_string()).collect(),
            include_source_sheets: true,
        }
    }

    /// Upper-cased sede keys without repeats, falling back to the defaults
    /// when none are set.
    fn sede_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for key in self.sedes.iter().map(|s| s.trim().to_uppercase()) {
            if !key.is_empty() && !keys.contains(&key) {
                keys.push(key);
            }
        }
        if keys.is_empty() {
            DEFAULT_SEDES.iter().map(|s| s.to_string()).collect()
        } else {
            keys
        }
    }
}

/// Keep digits only, left-padded with zeros to 8. Empty when there are none.
pub fn normalize_dni(raw: &str) -> String {
    let s = raw.trim();
    let s = s.strip_suffix(".0").unwrap_or(s);
    let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return digits;
    }
    format!("{digits:0>8}")
}

/// First sede key contained in `text`; otherwise the first key.
pub fn sede_key(text: &str, sedes: &[String]) -> String {
    let upper = text.to_uppercase();
    sedes
        .iter()
        .find(|key| upper.contains(key.as_str()))
        .or_else(|| sedes.first())
        .cloned()
        .unwrap_or_default()
}

/// "CHINCHA" → "Chincha", "SAN JUAN" → "San_Juan".
fn title_case(key: &str) -> String {
    key.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join("_")
}

/// Longest sheet name Excel accepts.
const MAX_SHEET_NAME: usize = 31;

/// Excel sheet names: at most 31 characters, none of `[]:*?/\`.
fn sheet_name(prefix: &str, key: &str) -> String {
    format!("{prefix}{}", title_case(key))
        .chars()
        .map(|c| if "[]:*?/\\".contains(c) { '_' } else { c })
        .take(MAX_SHEET_NAME)
        .collect()
}

/// `name`, or `name` with a `_2`, `_3`, ... suffix when a sheet already uses
/// it. Excel compares sheet names case-insensitively.
fn unique_sheet_name(name: String, used: &mut Vec<String>) -> String {
    let taken = |candidate: &str, used: &[String]| {
        let lower = candidate.to_lowercase();
        used.iter().any(|u| u.to_lowercase() == lower)
    };
    let mut candidate = name.clone();
    let mut n = 2;
    while taken(&candidate, used.as_slice()) {
        let suffix = format!("_{n}");
        let stem: String = name
            .chars()
            .take(MAX_SHEET_NAME - suffix.chars().count())
            .collect();
        candidate = format!("{stem}{suffix}");
        n += 1;
    }
    used.push(candidate.clone());
    candidate
}

/// The two sheet families rendered per sede.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActaKind {
    ActaFinal,
    Consolidado,
}

impl ActaKind {
    pub fn prefix(self) -> &'static str {
        match self {
            ActaKind::ActaFinal => "Acta_Final_",
            ActaKind::Consolidado => "Consolidado_",
        }
    }

    fn title(self) -> &'static str {
        match self {
            ActaKind::ActaFinal => "ACTA FINAL DE RESULTADOS",
            ActaKind::Consolidado => "CONSOLIDADO DE RESULTADOS",
        }
    }

    /// Consolidado sheets omit MODALIDAD DE INGRESO.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            ActaKind::ActaFinal => &ACTA_COLUMNS,
            ActaKind::Consolidado => &ACTA_COLUMNS[..25],
        }
    }
}

/// One student line of an acta.
#[derive(Debug, Clone)]
pub struct ActaRow {
    pub apellidos: String,
    pub nombres: String,
    /// Normalised 8-digit DNI (raw text when it has no digits). Rows sort by it.
    pub dni: String,
    pub codigo: String,
    pub correo: String,
    pub area: String,
    pub carrera: String,
    pub sede: String,
    pub asistencia: String,
    /// COM, %COM, HAB, %HAB, MAT, %MAT, CTA, %CTA, TOTAL, %TOTAL.
    pub scores: Vec<CellValue>,
    pub condicion: String,
    pub sede_key: String,
}

fn text_at(sheet: &Sheet, row: usize, col: Option<usize>) -> String {
    col.map(|c| sheet.cell(row, c).as_text()).unwrap_or_default()
}

/// Join RESUMEN with RESULTADOS by normalised DNI and assign sede keys.
///
/// Rows come back sorted by programa, then DNI.
pub fn join_rows(
    source: &SourceWorkbook,
    sedes: &[String],
) -> Result<Vec<ActaRow>, ReportError> {
    let res = &source.resultados;
    let res_idx = res.header_index();
    let res_dni = res_idx.require(RESULTADOS, &["Numero de DNI", "Número de DNI"])?;
    let res_apellidos = res_idx.locate(&["Apellido(s)", "Apellidos"]);
    let res_nombre = res_idx.locate(&["Nombre", "Nombres"]);
    let res_correo = res_idx.locate(&["Dirección de correo", "Correo"]);
    let res_codigo = res_idx.locate(&["Código de Matrícula"]);

    let mut by_dni: HashMap<String, usize> = HashMap::new();
    for row in 0..res.len() {
        let dni = normalize_dni(&res.cell(row, res_dni).as_text());
        if !dni.is_empty() {
            by_dni.entry(dni).or_insert(row);
        }
    }

    let sum = &source.resumen;
    let sum_idx = sum.header_index().reserving(&RESUMEN_COLUMNS);
    let sum_dni = sum_idx.require(RESUMEN, &["DNI"])?;
    let sum_sede = sum_idx.require(RESUMEN, &["Sede o Filial"])?;
    let sum_programa = sum_idx.require(RESUMEN, &["Programa Académico"])?;
    let sum_area = sum_idx.locate(&["Área"]);
    let sum_asistencia = sum_idx.locate(&["Asistencia"]);
    let sum_condicion = sum_idx.locate(&["CONDICIÓN"]);
    let score_cols: Vec<Option<usize>> = SCORE_COLUMNS
        .iter()
        .map(|c| sum_idx.locate(&[*c]))
        .collect();

    let mut rows: Vec<ActaRow> = (0..sum.len())
        .map(|row| {
            let raw_dni = sum.cell(row, sum_dni).as_text();
            let dni = normalize_dni(&raw_dni);
            let matched = by_dni.get(&dni).copied();
            let from_res = |col: Option<usize>| {
                matched
                    .map(|r| text_at(res, r, col))
                    .unwrap_or_default()
            };
            let sede = sum.cell(row, sum_sede).as_text();
            ActaRow {
                apellidos: from_res(res_apellidos),
                nombres: from_res(res_nombre),
                dni: if dni.is_empty() { raw_dni } else { dni },
                codigo: from_res(res_codigo),
                correo: from_res(res_correo),
                area: text_at(sum, row, sum_area),
                carrera: sum.cell(row, sum_programa).as_text(),
                sede_key: sede_key(&sede, sedes),
                sede,
                asistencia: text_at(sum, row, sum_asistencia),
                scores: score_cols
                    .iter()
                    .map(|c| c.map(|c| sum.cell(row, c).clone()).unwrap_or(CellValue::Empty))
                    .collect(),
                condicion: text_at(sum, row, sum_condicion),
            }
        })
        .collect();

    let unmatched = rows
        .iter()
        .filter(|r| r.apellidos.is_empty() && r.nombres.is_empty())
        .count();
    if unmatched > 0 {
        tracing::warn!(unmatched, "RESUMEN rows without a RESULTADOS match");
    }

    rows.sort_by(|a, b| a.carrera.cmp(&b.carrera).then_with(|| a.dni.cmp(&b.dni)));
    Ok(rows)
}

struct ActaFormats {
    title: Format,
    subtitle: Format,
    header: Format,
    cell: Format,
    number: Format,
    percent: Format,
    date: Format,
}

impl ActaFormats {
    fn new() -> Self {
        let bordered = Format::new().set_border(FormatBorder::Thin);
        Self {
            title: Format::new()
                .set_bold()
                .set_font_size(14)
                .set_align(FormatAlign::Center),
            subtitle: Format::new().set_bold().set_align(FormatAlign::Center),
            header: Formats::new().header,
            number: bordered.clone().set_num_format("0.00"),
            percent: bordered.clone().set_num_format("0.00%"),
            date: bordered.clone().set_num_format("dd/mm/yyyy"),
            cell: bordered,
        }
    }
}

fn write_score(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &CellValue,
    format: &Format,
    fallback: &Format,
) -> Result<(), ReportError> {
    match value {
        CellValue::Number(n) => worksheet.write_number_with_format(row, col, *n, format)?,
        CellValue::Text(s) => worksheet.write_string_with_format(row, col, s, fallback)?,
        CellValue::Empty => worksheet.write_blank(row, col, fallback)?,
    };
    Ok(())
}

fn add_acta_sheet(
    workbook: &mut Workbook,
    kind: ActaKind,
    key: &str,
    rows: &[&ActaRow],
    options: &ActasOptions,
    used_names: &mut Vec<String>,
) -> Result<String, ReportError> {
    let formats = ActaFormats::new();
    let name = unique_sheet_name(sheet_name(kind.prefix(), key), used_names);
    let columns: Vec<String> = kind.columns().iter().map(|s| s.to_string()).collect();
    let last_col = columns.len() as u16 - 1;
    let exam_date = ExcelDateTime::from_ymd(
        options.exam_date.year() as u16,
        options.exam_date.month() as u8,
        options.exam_date.day() as u8,
    )?;

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(&name)?;
    worksheet.merge_range(
        0,
        0,
        0,
        last_col,
        &format!("{} - SEDE {key}", kind.title()),
        &formats.title,
    )?;
    worksheet.merge_range(
        1,
        0,
        1,
        last_col,
        &format!("{} - {}", options.exam_label, options.exam_date.format("%d/%m/%Y")),
        &formats.subtitle,
    )?;
    write_header(worksheet, HEADER_ROW, &columns, &formats.header)?;
    worksheet.set_freeze_panes(HEADER_ROW + 1, 0)?;

    for (i, r) in rows.iter().enumerate() {
        let row = HEADER_ROW + 1 + i as u32;
        worksheet.write_number_with_format(row, 0, (i + 1) as f64, &formats.cell)?;
        let texts = [
            r.apellidos.as_str(),
            r.nombres.as_str(),
            r.dni.as_str(),
            r.codigo.as_str(),
            "",
            r.correo.as_str(),
            r.area.as_str(),
            r.carrera.as_str(),
            r.sede.as_str(),
            r.asistencia.as_str(),
        ];
        for (offset, value) in texts.iter().enumerate() {
            worksheet.write_string_with_format(row, 1 + offset as u16, *value, &formats.cell)?;
        }
        for (offset, value) in r.scores.iter().enumerate() {
            let format = if offset % 2 == 0 {
                &formats.number
            } else {
                &formats.percent
            };
            write_score(worksheet, row, 11 + offset as u16, value, format, &formats.cell)?;
        }
        worksheet.write_string_with_format(row, 21, &r.condicion, &formats.cell)?;
        worksheet.write_blank(row, 22, &formats.cell)?;
        worksheet.write_datetime_with_format(row, 23, &exam_date, &formats.date)?;
        worksheet.write_string_with_format(row, 24, &options.exam_label, &formats.cell)?;
        if kind == ActaKind::ActaFinal {
            worksheet.write_blank(row, 25, &formats.cell)?;
        }
    }

    worksheet.set_column_width(0, 6)?;
    worksheet.set_column_width(1, 24)?;
    worksheet.set_column_width(2, 20)?;
    worksheet.set_column_width(6, 28)?;
    worksheet.set_column_width(8, 28)?;
    worksheet.set_column_width(9, 18)?;
    worksheet.set_column_width(23, 12)?;
    worksheet.set_column_width(24, 20)?;
    Ok(name)
}

/// Copy a sheet's values verbatim.
fn add_copied_sheet(workbook: &mut Workbook, sheet: &Sheet) -> Result<(), ReportError> {
    let header = Formats::new().header;
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(&sheet.name)?;
    write_header(worksheet, 0, &sheet.headers, &header)?;
    for (i, cells) in sheet.rows.iter().enumerate() {
        let row = i as u32 + 1;
        for (col, value) in cells.iter().enumerate() {
            match value {
                CellValue::Number(n) => {
                    worksheet.write_number(row, col as u16, *n)?;
                }
                CellValue::Text(s) => {
                    worksheet.write_string(row, col as u16, s)?;
                }
                CellValue::Empty => {}
            }
        }
    }
    worksheet.set_freeze_panes(1, 0)?;
    Ok(())
}

/// Sheets written by [`write_actas`] with their data row counts.
#[derive(Debug, Clone, Default)]
pub struct ActasOutcome {
    pub sheets: Vec<(String, usize)>,
}

impl ActasOutcome {
    pub fn rows_in(&self, sheet: &str) -> Option<usize> {
        self.sheets.iter().find(|(n, _)| n == sheet).map(|(_, c)| *c)
    }
}

/// Render the actas workbook for `source` into `path`.
pub fn write_actas(
    path: &Path,
    source: &SourceWorkbook,
    options: &ActasOptions,
) -> Result<ActasOutcome, ReportError> {
    let sedes = options.sede_keys();
    let rows = join_rows(source, &sedes)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut workbook = Workbook::new();
    let mut outcome = ActasOutcome::default();
    let mut used_names: Vec<String> = Vec::new();
    if options.include_source_sheets {
        add_copied_sheet(&mut workbook, &source.resultados)?;
        add_copied_sheet(&mut workbook, &source.resumen)?;
        outcome.sheets.push((RESULTADOS.to_string(), source.resultados.len()));
        outcome.sheets.push((RESUMEN.to_string(), source.resumen.len()));
        used_names.push(source.resultados.name.clone());
        used_names.push(source.resumen.name.clone());
    }

    for kind in [ActaKind::ActaFinal, ActaKind::Consolidado] {
        for key in &sedes {
            let sede_rows: Vec<&ActaRow> = rows.iter().filter(|r| &r.sede_key == key).collect();
            let name =
                add_acta_sheet(&mut workbook, kind, key, &sede_rows, options, &mut used_names)?;
            outcome.sheets.push((name, sede_rows.len()));
        }
    }

    workbook.save(path)?;
    tracing::info!(path = %path.display(), students = rows.len(), "actas written");
    Ok(outcome)
}
