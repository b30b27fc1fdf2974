//! Per-student summary rows (the RESUMEN sheet) and nivelación flags.
//!
//! Each subject's points are `criterion * percent`, where the criterion is
//! the area's weight for that subject (the four weights add up to 100). A
//! subject requires nivelación when its percent is at or below the
//! configured threshold.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ScoringError;
use crate::model::{Area, Subject};
use crate::results::{sort_rows, ResultRow};

/// Default nivelación threshold (30%).
pub const DEFAULT_NIVELACION_THRESHOLD: f64 = 0.30;

pub const ASISTIO: &str = "ASISTIÓ";
pub const INGRESO: &str = "INGRESÓ";

/// Weights and thresholds used to build the summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Per-area subject weight overrides; missing entries use the defaults.
    #[serde(default)]
    pub criteria: BTreeMap<Area, BTreeMap<Subject, f64>>,
    /// Threshold used when no per-area override exists.
    #[serde(default = "default_threshold")]
    pub nivelacion_threshold: f64,
    /// Per-area, per-subject threshold overrides.
    #[serde(default)]
    pub nivelacion: BTreeMap<Area, BTreeMap<Subject, f64>>,
}

fn default_threshold() -> f64 {
    DEFAULT_NIVELACION_THRESHOLD
}

/// Default weight of `subject` in `area`, equal to its question count.
pub fn default_criterion(area: Area, subject: Subject) -> f64 {
    area.definition().question_count(subject) as f64
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            criteria: BTreeMap::new(),
            nivelacion_threshold: DEFAULT_NIVELACION_THRESHOLD,
            nivelacion: BTreeMap::new(),
        }
    }
}

impl ScoringConfig {
    pub fn criterion(&self, area: Area, subject: Subject) -> f64 {
        self.criteria
            .get(&area)
            .and_then(|m| m.get(&subject))
            .copied()
            .unwrap_or_else(|| default_criterion(area, subject))
    }

    pub fn threshold(&self, area: Area, subject: Subject) -> f64 {
        self.nivelacion
            .get(&area)
            .and_then(|m| m.get(&subject))
            .copied()
            .unwrap_or(self.nivelacion_threshold)
    }

    /// Check that thresholds are fractions and criteria are non-negative.
    pub fn validate(&self) -> Result<(), ScoringError> {
        let in_range = |scope: String, value: f64| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ScoringError::ThresholdOutOfRange { scope, value })
            }
        };
        in_range("base".into(), self.nivelacion_threshold)?;
        for (area, subjects) in &self.nivelacion {
            for (subject, value) in subjects {
                in_range(format!("area {area} {subject}"), *value)?;
            }
        }
        for (area, subjects) in &self.criteria {
            for (subject, value) in subjects {
                if *value < 0.0 || value.is_nan() {
                    return Err(ScoringError::NegativeCriterion {
                        scope: format!("area {area} {subject}"),
                        value: *value,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Summary values for one subject.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubjectSummary {
    pub puntaje: f64,
    pub criterio: f64,
    pub percent: f64,
}

/// Per-course nivelación labels as they appear in the sheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Nivelacion {
    pub comunicacion: String,
    pub habilidades: String,
    pub matematica: String,
    pub cta: String,
    pub ccss: String,
}

impl Nivelacion {
    pub fn required(&self) -> bool {
        [
            &self.comunicacion,
            &self.habilidades,
            &self.matematica,
            &self.cta,
            &self.ccss,
        ]
        .iter()
        .any(|s| !s.is_empty())
    }

    /// `SI` when any course requires nivelación.
    pub fn programa(&self) -> &'static str {
        if self.required() {
            "SI"
        } else {
            "NO"
        }
    }
}

/// One RESUMEN row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRow {
    pub apellidos_y_nombres: String,
    pub dni: String,
    pub codigo_matricula: String,
    pub programa: String,
    pub sede: String,
    pub area: Area,
    pub asistencia: String,
    pub subjects: BTreeMap<Subject, SubjectSummary>,
    pub total: f64,
    pub preguntas_respondidas: usize,
    pub preguntas_no_respondidas: usize,
    pub pct_respondidas: f64,
    pub pct_no_respondidas: f64,
    pub condicion: String,
    pub nivelacion: Nivelacion,
}

impl SummaryRow {
    pub fn subject(&self, subject: Subject) -> SubjectSummary {
        self.subjects.get(&subject).copied().unwrap_or(SubjectSummary {
            puntaje: 0.0,
            criterio: 0.0,
            percent: 0.0,
        })
    }

    /// TOTAL as a fraction of 100.
    pub fn pct_total(&self) -> f64 {
        self.total / 100.0
    }

    pub fn programa_nivelacion(&self) -> &'static str {
        self.nivelacion.programa()
    }
}

/// Build the summary row for one result row.
pub fn summarize_row(row: &ResultRow, config: &ScoringConfig) -> SummaryRow {
    let area = row.area;
    let subjects: BTreeMap<Subject, SubjectSummary> = Subject::ALL
        .iter()
        .map(|&subject| {
            let percent = row.percent(subject);
            let criterio = config.criterion(area, subject);
            (
                subject,
                SubjectSummary {
                    puntaje: criterio * percent,
                    criterio,
                    percent,
                },
            )
        })
        .collect();
    let total = subjects.values().map(|s| s.puntaje).sum();

    let needs = |subject: Subject| row.percent(subject) <= config.threshold(area, subject);
    let label = |flag: bool, text: &str| if flag { text.to_string() } else { String::new() };

    let cta_flag = needs(Subject::CtaCcss);
    let nivelacion = Nivelacion {
        comunicacion: label(needs(Subject::Comunicacion), "COMUNICACIÓN"),
        habilidades: label(
            needs(Subject::HabilidadesComunicativas),
            "HABILIDADES COMUNICATIVAS",
        ),
        matematica: label(needs(Subject::Matematica), "MATEMATICA"),
        cta: label(cta_flag && area != Area::C, "CIENCIA, TECNOLOGÍA Y AMBIENTE"),
        ccss: label(cta_flag && area == Area::C, "CIENCIAS SOCIALES"),
    };

    let condicion = if row.calificacion.unwrap_or(0.0) > 0.0 {
        INGRESO.to_string()
    } else {
        String::new()
    };

    SummaryRow {
        apellidos_y_nombres: format!("{} {}", row.apellidos, row.nombre)
            .trim()
            .to_string(),
        dni: row.dni.clone(),
        codigo_matricula: row.codigo_matricula.clone(),
        programa: row.programa.clone(),
        sede: row.sede.clone(),
        area,
        asistencia: ASISTIO.to_string(),
        subjects,
        total,
        preguntas_respondidas: row.scores.responded,
        preguntas_no_respondidas: row.scores.not_responded(),
        pct_respondidas: row.scores.responded_fraction(),
        pct_no_respondidas: row.scores.not_responded_fraction(),
        condicion,
        nivelacion,
    }
}

/// Summarise every row, ordered by programa then DNI.
pub fn summarize(rows: &[ResultRow], config: &ScoringConfig) -> Vec<SummaryRow> {
    let mut sorted = rows.to_vec();
    sort_rows(&mut sorted);
    sorted.iter().map(|r| summarize_row(r, config)).collect()
}
