//! Export run report with JSON persistence.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Area, Quiz};
use crate::results::ResultRow;

/// The outcome of one export run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportReport {
    /// Unique run identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// Examination day.
    pub exam_date: NaiveDate,
    /// Local offset used for the day window, e.g. "-05:00".
    pub tz_offset: String,
    /// Quizzes that were processed, with their area.
    pub quizzes: Vec<ProcessedQuiz>,
    /// Number of filtered users per course.
    pub users_per_course: BTreeMap<i64, usize>,
    /// (quiz, user) pairs scheduled.
    pub pairs_total: usize,
    /// Pairs that failed and were skipped.
    pub pairs_failed: usize,
    /// One row per attempt, sorted by programa then DNI.
    pub rows: Vec<ResultRow>,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// A quiz included in the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedQuiz {
    pub quiz: Quiz,
    pub area: Area,
}

/// Attempts and average score of one area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AreaTally {
    pub attempts: usize,
    pub avg_puntaje: f64,
}

impl ExportReport {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Attempts per area with their average PUNTAJE (out of 20).
    pub fn tally_by_area(&self) -> BTreeMap<Area, AreaTally> {
        let mut sums: BTreeMap<Area, (usize, f64)> = BTreeMap::new();
        for row in &self.rows {
            let entry = sums.entry(row.area).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += row.scores.puntaje();
        }
        sums.into_iter()
            .map(|(area, (n, sum))| {
                (
                    area,
                    AreaTally {
                        attempts: n,
                        avg_puntaje: if n == 0 { 0.0 } else { sum / n as f64 },
                    },
                )
            })
            .collect()
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: ExportReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Attempt, AttemptReview, Student};
    use crate::results::build_result_row;
    use crate::window::ExamWindow;

    fn make_report(areas: &[Area]) -> ExportReport {
        let window = ExamWindow::parse("2025-03-09", "-05:00").unwrap();
        let quiz = Quiz {
            course_id: 1,
            quiz_id: 10,
            name: "Admisión".into(),
        };
        let attempt = Attempt {
            id: 1,
            state: "finished".into(),
            time_start: window.from,
            time_finish: window.from + 600,
        };
        let rows = areas
            .iter()
            .map(|a| {
                build_result_row(
                    &Student::default(),
                    &quiz,
                    *a,
                    &attempt,
                    &AttemptReview::default(),
                    &window,
                )
            })
            .collect();
        ExportReport {
            id: Uuid::nil(),
            created_at: Utc::now(),
            exam_date: window.date,
            tz_offset: "-05:00".into(),
            quizzes: vec![ProcessedQuiz { quiz, area: Area::A }],
            users_per_course: BTreeMap::from([(1, areas.len())]),
            pairs_total: areas.len(),
            pairs_failed: 0,
            rows,
            duration_ms: 12,
        }
    }

    #[test]
    fn tally_counts_attempts_per_area() {
        let report = make_report(&[Area::A, Area::A, Area::C]);
        let tally = report.tally_by_area();
        assert_eq!(tally[&Area::A].attempts, 2);
        assert_eq!(tally[&Area::C].attempts, 1);
        assert!(!tally.contains_key(&Area::B));
        assert_eq!(tally[&Area::A].avg_puntaje, 0.0);
    }

    #[test]
    fn json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.json");
        let report = make_report(&[Area::B]);
        report.save_json(&path).unwrap();

        let loaded = ExportReport::load_json(&path).unwrap();
        assert_eq!(loaded.rows.len(), 1);
        assert_eq!(loaded.rows[0].area, Area::B);
        assert_eq!(loaded.exam_date, report.exam_date);
        assert_eq!(loaded.users_per_course[&1], 1);
    }
}
