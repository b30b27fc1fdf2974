//! Core trait definitions for grading sources and progress reporting.
//!
//! `GradingSource` is implemented by the Moodle client and by the mock
//! source in `admision-moodle`.

use std::time::Duration;

use async_trait::async_trait;

use crate::model::{Attempt, AttemptReview, Quiz, Student};

/// A remote platform that holds quizzes, enrolments and attempt reviews.
#[async_trait]
pub trait GradingSource: Send + Sync {
    /// Human-readable source name (e.g. "moodle").
    fn name(&self) -> &str;

    /// Quizzes of every given course.
    async fn discover_quizzes(&self, course_ids: &[i64]) -> anyhow::Result<Vec<Quiz>>;

    /// Users enrolled in a course, keeping only those with one of `only_roles`
    /// (case-insensitive). An empty role list keeps everyone.
    async fn course_users(&self, course_id: i64, only_roles: &[String])
        -> anyhow::Result<Vec<Student>>;

    /// All attempts of a user in a quiz.
    async fn user_attempts(&self, quiz_id: i64, user_id: i64) -> anyhow::Result<Vec<Attempt>>;

    /// Review (grade and per-question marks) of one attempt.
    async fn attempt_review(&self, attempt_id: i64) -> anyhow::Result<AttemptReview>;
}

/// Keep users holding at least one of `only_roles`. Empty filter keeps all.
pub fn role_matches(user_roles: &[String], only_roles: &[String]) -> bool {
    if only_roles.is_empty() {
        return true;
    }
    user_roles.iter().any(|r| {
        only_roles
            .iter()
            .any(|wanted| wanted.trim().eq_ignore_ascii_case(r.trim()))
    })
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_pair_complete(&self, done: usize, total: usize, rows: usize);
    fn on_pair_error(&self, quiz_id: i64, user_id: i64, error: &str);
    fn on_export_complete(&self, total: usize, failed: usize, rows: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_pair_complete(&self, _: usize, _: usize, _: usize) {}
    fn on_pair_error(&self, _: i64, _: i64, _: &str) {}
    fn on_export_complete(&self, _: usize, _: usize, _: usize, _: Duration) {}
}
