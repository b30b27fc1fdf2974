//! Question normalisation and per-subject scoring.
//!
//! Every question is worth 0.2 points. A mark above zero counts as a correct
//! answer, zero (or negative) as answered-but-wrong, and a missing mark as
//! not answered.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{Area, AttemptReview, Mark, Subject, MAX_QUESTIONS};

/// Points awarded for a correct answer.
pub const POINTS_PER_QUESTION: f64 = 0.2;

const EPS: f64 = 1e-9;

/// Normalise a raw mark to 0.2 (correct), 0.0 (wrong) or `None` (blank).
pub fn normalize_mark(mark: Option<&Mark>) -> Option<f64> {
    let x = mark?.as_f64()?;
    if x > 0.0 {
        Some(POINTS_PER_QUESTION)
    } else {
        Some(0.0)
    }
}

fn is_correct(v: f64) -> bool {
    (v - POINTS_PER_QUESTION).abs() < EPS
}

fn is_responded(v: f64) -> bool {
    is_correct(v) || v.abs() < EPS
}

/// Count values equal to 0.2.
pub fn count_correct<'a>(vals: impl IntoIterator<Item = &'a Option<f64>>) -> usize {
    vals.into_iter().flatten().filter(|v| is_correct(**v)).count()
}

/// Count values equal to 0.2 or 0.0.
pub fn count_responded<'a>(vals: impl IntoIterator<Item = &'a Option<f64>>) -> usize {
    vals.into_iter().flatten().filter(|v| is_responded(**v)).count()
}

fn fraction(numer: usize, denom: usize) -> f64 {
    if denom == 0 {
        0.0
    } else {
        numer as f64 / denom as f64
    }
}

/// The 100 normalised question marks of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionVector(Vec<Option<f64>>);

impl Default for QuestionVector {
    fn default() -> Self {
        Self(vec![None; MAX_QUESTIONS])
    }
}

impl QuestionVector {
    /// Build the vector from an attempt review.
    ///
    /// Slots outside 1..=100 are ignored. When a question has no mark,
    /// `fraction * maxmark` is used if both are present.
    pub fn from_review(review: &AttemptReview) -> Self {
        let mut out = Self::default();
        for q in &review.questions {
            let Some(slot) = q.slot else { continue };
            if slot < 1 || slot as usize > MAX_QUESTIONS {
                continue;
            }
            let mark = match (&q.mark, q.fraction, q.maxmark) {
                (Some(m), _, _) => Some(m.clone()),
                (None, Some(frac), Some(max)) => Some(Mark::Number(frac * max)),
                _ => None,
            };
            out.0[slot as usize - 1] = normalize_mark(mark.as_ref());
        }
        out
    }

    /// Mark at a 1-based slot.
    pub fn get(&self, slot: usize) -> Option<f64> {
        slot.checked_sub(1).and_then(|i| self.0.get(i).copied().flatten())
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.0
    }

    /// Set a 1-based slot. Out-of-range slots are ignored.
    pub fn set(&mut self, slot: usize, value: Option<f64>) {
        if let Some(cell) = slot.checked_sub(1).and_then(|i| self.0.get_mut(i)) {
            *cell = value;
        }
    }

    pub fn responded(&self) -> usize {
        count_responded(&self.0)
    }
}

/// Score of one subject inside an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubjectScore {
    pub correct: usize,
    pub total: usize,
    /// Fraction of correct answers, 0..=1.
    pub percent: f64,
    /// `percent * total * 0.2`.
    pub points: f64,
}

/// Per-subject scores of one attempt plus the answered counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaScores {
    pub area: Area,
    pub subjects: BTreeMap<Subject, SubjectScore>,
    pub responded: usize,
}

impl AreaScores {
    pub fn compute(area: Area, questions: &QuestionVector) -> Self {
        let def = area.definition();
        let subjects = Subject::ALL
            .iter()
            .map(|&subject| {
                let slots = def.slots(subject);
                let vals: Vec<Option<f64>> = slots.iter().map(|&s| questions.get(s)).collect();
                let correct = count_correct(&vals);
                let total = slots.len();
                let percent = fraction(correct, total);
                let score = SubjectScore {
                    correct,
                    total,
                    percent,
                    points: percent * total as f64 * POINTS_PER_QUESTION,
                };
                (subject, score)
            })
            .collect();

        Self {
            area,
            subjects,
            responded: questions.responded(),
        }
    }

    pub fn subject(&self, subject: Subject) -> SubjectScore {
        self.subjects.get(&subject).copied().unwrap_or(SubjectScore {
            correct: 0,
            total: 0,
            percent: 0.0,
            points: 0.0,
        })
    }

    /// Sum of subject points, out of 20.
    pub fn puntaje(&self) -> f64 {
        self.subjects.values().map(|s| s.points).sum()
    }

    pub fn not_responded(&self) -> usize {
        MAX_QUESTIONS.saturating_sub(self.responded)
    }

    pub fn responded_fraction(&self) -> f64 {
        self.responded as f64 / MAX_QUESTIONS as f64
    }

    pub fn not_responded_fraction(&self) -> f64 {
        self.not_responded() as f64 / MAX_QUESTIONS as f64
    }
}
