//! In-memory grading source for testing.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use admision_core::model::{Attempt, AttemptReview, Quiz, Student};
use admision_core::traits::{role_matches, GradingSource};

/// A mock grading source for testing the export engine without a Moodle site.
///
/// Fixtures are registered with the builder methods before the source is
/// shared; afterwards it only counts calls.
#[derive(Default)]
pub struct MockSource {
    quizzes: Vec<Quiz>,
    /// course id → (user, role shortnames)
    users: HashMap<i64, Vec<(Student, Vec<String>)>>,
    /// (quiz id, user id) → attempts
    attempts: HashMap<(i64, i64), Vec<Attempt>>,
    reviews: HashMap<i64, AttemptReview>,
    failing_users: HashSet<i64>,
    call_count: AtomicU32,
    review_calls: AtomicU32,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quiz(mut self, course_id: i64, quiz_id: i64, name: &str) -> Self {
        self.quizzes.push(Quiz {
            course_id,
            quiz_id,
            name: name.to_string(),
        });
        self
    }

    pub fn with_user(mut self, course_id: i64, student: Student, roles: &[&str]) -> Self {
        self.users
            .entry(course_id)
            .or_default()
            .push((student, roles.iter().map(|r| r.to_string()).collect()));
        self
    }

    pub fn with_attempt(
        mut self,
        quiz_id: i64,
        user_id: i64,
        attempt: Attempt,
        review: AttemptReview,
    ) -> Self {
        self.reviews.insert(attempt.id, review);
        self.attempts
            .entry((quiz_id, user_id))
            .or_default()
            .push(attempt);
        self
    }

    /// Make every attempt lookup for this user fail.
    pub fn failing_for_user(mut self, user_id: i64) -> Self {
        self.failing_users.insert(user_id);
        self
    }

    /// Total calls made to this source.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Calls made to `attempt_review`.
    pub fn review_calls(&self) -> u32 {
        self.review_calls.load(Ordering::Relaxed)
    }

    fn record_call(&self) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl GradingSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn discover_quizzes(&self, course_ids: &[i64]) -> anyhow::Result<Vec<Quiz>> {
        self.record_call();
        Ok(course_ids
            .iter()
            .flat_map(|cid| self.quizzes.iter().filter(move |q| q.course_id == *cid))
            .cloned()
            .collect())
    }

    async fn course_users(
        &self,
        course_id: i64,
        only_roles: &[String],
    ) -> anyhow::Result<Vec<Student>> {
        self.record_call();
        Ok(self
            .users
            .get(&course_id)
            .map(|users| {
                users
                    .iter()
                    .filter(|(_, roles)| role_matches(roles, only_roles))
                    .map(|(s, _)| s.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn user_attempts(&self, quiz_id: i64, user_id: i64) -> anyhow::Result<Vec<Attempt>> {
        self.record_call();
        if self.failing_users.contains(&user_id) {
            anyhow::bail!("simulated failure for user {user_id}");
        }
        Ok(self
            .attempts
            .get(&(quiz_id, user_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn attempt_review(&self, attempt_id: i64) -> anyhow::Result<AttemptReview> {
        self.record_call();
        self.review_calls.fetch_add(1, Ordering::Relaxed);
        self.reviews
            .get(&attempt_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no review for attempt {attempt_id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(id: i64) -> Student {
        Student {
            id,
            firstname: format!("User{id}"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn serves_fixtures() {
        let source = MockSource::new()
            .with_quiz(1, 10, "Examen A")
            .with_quiz(2, 20, "Examen C")
            .with_user(1, student(7), &["student"])
            .with_user(1, student(8), &["teacher"])
            .with_attempt(10, 7, Attempt { id: 70, ..Default::default() }, AttemptReview::default());

        let quizzes = source.discover_quizzes(&[1]).await.unwrap();
        assert_eq!(quizzes.len(), 1);
        assert_eq!(quizzes[0].quiz_id, 10);

        let users = source.course_users(1, &["student".into()]).await.unwrap();
        assert_eq!(users.len(), 1);
        assert!(source.course_users(99, &[]).await.unwrap().is_empty());

        let attempts = source.user_attempts(10, 7).await.unwrap();
        assert_eq!(attempts[0].id, 70);
        assert!(source.attempt_review(70).await.is_ok());
        assert!(source.attempt_review(71).await.is_err());

        assert_eq!(source.call_count(), 6);
        assert_eq!(source.review_calls(), 2);
    }

    #[tokio::test]
    async fn drives_the_export_engine() {
        use std::sync::Arc;

        use admision_core::engine::{ExportEngine, ExportEngineConfig, ExportRequest};
        use admision_core::model::QuizAreaMap;
        use admision_core::traits::NoopReporter;
        use admision_core::window::ExamWindow;

        let window = ExamWindow::parse("2025-03-09", "-05:00").unwrap();
        let inside = Attempt {
            id: 70,
            state: "finished".into(),
            time_start: window.from + 3600,
            time_finish: window.from + 7200,
        };
        let source = Arc::new(
            MockSource::new()
                .with_quiz(1, 10, "Examen Ingenierías")
                .with_quiz(1, 11, "Encuesta")
                .with_user(1, student(7), &["student"])
                .with_user(1, student(8), &["student"])
                .with_attempt(10, 7, inside, AttemptReview::default())
                .failing_for_user(8),
        );

        let engine = ExportEngine::new(source.clone(), ExportEngineConfig::default());
        let request = ExportRequest {
            course_ids: vec![1],
            quiz_map: QuizAreaMap::parse("10=A"),
            window,
            tz_offset: "-05:00".into(),
        };
        let report = engine.run(&request, &NoopReporter).await.unwrap();

        assert_eq!(report.quizzes.len(), 1);
        assert_eq!(report.pairs_total, 2);
        assert_eq!(report.pairs_failed, 1);
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].attempt_id, 70);
        assert_eq!(source.review_calls(), 1);
    }

    #[tokio::test]
    async fn failing_user() {
        let source = MockSource::new().failing_for_user(3);
        assert!(source.user_attempts(1, 3).await.is_err());
        assert!(source.user_attempts(1, 4).await.unwrap().is_empty());
    }
}
