//! Per-attempt result rows (the RESULTADOS sheet).

use serde::{Deserialize, Serialize};

use crate::model::{Area, Attempt, AttemptReview, Quiz, Student, Subject};
use crate::scoring::{AreaScores, QuestionVector};
use crate::window::ExamWindow;

/// One reviewed attempt with student data and computed scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRow {
    pub apellidos: String,
    pub nombre: String,
    pub correo: String,
    pub dni: String,
    pub codigo_matricula: String,
    pub programa: String,
    pub sede: String,
    pub area: Area,
    pub estado: String,
    /// Local start time, `%Y-%m-%d %H:%M:%S`.
    pub comenzado: String,
    /// Local finish time, `%Y-%m-%d %H:%M:%S`.
    pub finalizado: String,
    pub minutos: i64,
    /// Grade out of 20 as reported by the platform.
    pub calificacion: Option<f64>,
    pub quiz_id: i64,
    pub course_id: i64,
    pub attempt_id: i64,
    pub questions: QuestionVector,
    pub scores: AreaScores,
}

impl ResultRow {
    /// `"{n} min"` as shown in the sheet.
    pub fn tiempo_requerido(&self) -> String {
        format!("{} min", self.minutos)
    }

    pub fn percent(&self, subject: Subject) -> f64 {
        self.scores.subject(subject).percent
    }

    pub fn points(&self, subject: Subject) -> f64 {
        self.scores.subject(subject).points
    }
}

/// Build the RESULTADOS row for one reviewed attempt.
pub fn build_result_row(
    student: &Student,
    quiz: &Quiz,
    area: Area,
    attempt: &Attempt,
    review: &AttemptReview,
    window: &ExamWindow,
) -> ResultRow {
    let questions = QuestionVector::from_review(review);
    let scores = AreaScores::compute(area, &questions);
    let ts = attempt.time_start;
    let tf = attempt.time_finish;

    ResultRow {
        apellidos: student.lastname.clone(),
        nombre: student.firstname.clone(),
        correo: student.email.clone(),
        dni: student.dni().to_string(),
        codigo_matricula: student.codigo_matricula().to_string(),
        programa: student.programa().to_string(),
        sede: student.sede().to_string(),
        area,
        estado: attempt.state.clone(),
        comenzado: window.format_local(ts),
        finalizado: window.format_local(tf),
        minutos: (tf - ts).max(0) / 60,
        calificacion: review.grade,
        quiz_id: quiz.quiz_id,
        course_id: quiz.course_id,
        attempt_id: attempt.id,
        questions,
        scores,
    }
}

/// Stable sort by programa académico, then DNI.
pub fn sort_rows(rows: &mut [ResultRow]) {
    rows.sort_by(|a, b| a.programa.cmp(&b.programa).then_with(|| a.dni.cmp(&b.dni)));
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::model::{Mark, ReviewedQuestion, CF_DNI, CF_PROGRAMA};

    fn student(id: i64, dni: &str, programa: &str) -> Student {
        let mut custom = HashMap::new();
        custom.insert(CF_DNI.to_string(), dni.to_string());
        custom.insert(CF_PROGRAMA.to_string(), programa.to_string());
        Student {
            id,
            firstname: "Ana".into(),
            lastname: "Quispe".into(),
            email: "ana@example.edu".into(),
            idnumber: String::new(),
            custom,
        }
    }

    fn quiz() -> Quiz {
        Quiz {
            course_id: 100,
            quiz_id: 11907,
            name: "Admisión Ingenierías".into(),
        }
    }

    #[test]
    fn builds_row_with_scores_and_times() {
        let window = ExamWindow::parse("2025-03-09", "-05:00").unwrap();
        let attempt = Attempt {
            id: 77,
            state: "finished".into(),
            time_start: window.from + 8 * 3600,
            time_finish: window.from + 8 * 3600 + 125 * 60 + 30,
        };
        let review = AttemptReview {
            grade: Some(12.4),
            questions: (22..=71)
                .map(|slot| ReviewedQuestion {
                    slot: Some(slot),
                    mark: Some(Mark::Text("0,20".into())),
                    ..Default::default()
                })
                .collect(),
        };
        let row = build_result_row(
            &student(5, "12345678", "SISTEMAS"),
            &quiz(),
            Area::A,
            &attempt,
            &review,
            &window,
        );

        assert_eq!(row.comenzado, "2025-03-09 08:00:00");
        assert_eq!(row.finalizado, "2025-03-09 10:05:30");
        assert_eq!(row.tiempo_requerido(), "125 min");
        assert_eq!(row.dni, "12345678");
        assert_eq!(row.programa, "SISTEMAS");
        assert_eq!(row.sede, "");
        assert_eq!(row.quiz_id, 11907);
        assert_eq!(row.attempt_id, 77);
        assert!((row.percent(Subject::Matematica) - 1.0).abs() < 1e-9);
        assert!((row.scores.puntaje() - 10.0).abs() < 1e-9);
        assert_eq!(row.scores.responded, 50);
    }

    #[test]
    fn negative_duration_is_zero() {
        let window = ExamWindow::parse("2025-03-09", "-05:00").unwrap();
        let attempt = Attempt {
            id: 1,
            state: "finished".into(),
            time_start: window.from + 600,
            time_finish: window.from + 60,
        };
        let row = build_result_row(
            &student(1, "1", "X"),
            &quiz(),
            Area::B,
            &attempt,
            &AttemptReview::default(),
            &window,
        );
        assert_eq!(row.minutos, 0);
        assert_eq!(row.calificacion, None);
    }

    #[test]
    fn sorting_is_by_programa_then_dni() {
        let window = ExamWindow::parse("2025-03-09", "-05:00").unwrap();
        let attempt = Attempt {
            id: 1,
            time_start: window.from,
            time_finish: window.from + 60,
            ..Default::default()
        };
        let make = |dni: &str, prog: &str| {
            build_result_row(
                &student(1, dni, prog),
                &quiz(),
                Area::A,
                &attempt,
                &AttemptReview::default(),
                &window,
            )
        };
        let mut rows = vec![
            make("30000000", "MEDICINA"),
            make("20000000", "DERECHO"),
            make("10000000", "MEDICINA"),
        ];
        sort_rows(&mut rows);
        let order: Vec<&str> = rows.iter().map(|r| r.dni.as_str()).collect();
        assert_eq!(order, vec!["20000000", "10000000", "30000000"]);
    }
}
