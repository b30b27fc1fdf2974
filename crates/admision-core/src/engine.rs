//! Central export orchestrator.
//!
//! Discovers the mapped quizzes, loads the enrolled users and fans out one
//! task per (quiz, user) pair over a bounded pool. A failing pair is logged
//! and skipped; the rest of the export continues.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::model::{Area, Quiz, QuizAreaMap, Student};
use crate::report::{ExportReport, ProcessedQuiz};
use crate::results::{build_result_row, sort_rows, ResultRow};
use crate::traits::{GradingSource, ProgressReporter};
use crate::window::ExamWindow;

/// Configuration for the export engine.
#[derive(Debug, Clone)]
pub struct ExportEngineConfig {
    /// Maximum concurrent (quiz, user) tasks.
    pub workers: usize,
    /// Roles kept when listing course users.
    pub only_roles: Vec<String>,
    /// Log progress every this many completed pairs.
    pub progress_every: usize,
}

impl Default for ExportEngineConfig {
    fn default() -> Self {
        Self {
            workers: 16,
            only_roles: vec!["student".to_string()],
            progress_every: 100,
        }
    }
}

/// What to export.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub course_ids: Vec<i64>,
    pub quiz_map: QuizAreaMap,
    pub window: ExamWindow,
    /// Original offset string, kept for the report.
    pub tz_offset: String,
}

/// The central export engine.
pub struct ExportEngine {
    source: Arc<dyn GradingSource>,
    config: ExportEngineConfig,
}

impl ExportEngine {
    pub fn new(source: Arc<dyn GradingSource>, config: ExportEngineConfig) -> Self {
        Self { source, config }
    }

    /// Quizzes of the requested courses that appear in the quiz→area map.
    pub async fn target_quizzes(&self, request: &ExportRequest) -> Result<Vec<ProcessedQuiz>> {
        let quizzes = self.source.discover_quizzes(&request.course_ids).await?;
        let targets: Vec<ProcessedQuiz> = quizzes
            .into_iter()
            .filter_map(|quiz| {
                request
                    .quiz_map
                    .get(quiz.quiz_id)
                    .map(|area| ProcessedQuiz { quiz, area })
            })
            .collect();

        if targets.is_empty() {
            tracing::warn!(
                "none of the mapped quizzes ({}) belong to the given courses",
                request.quiz_map
            );
        } else {
            let names: Vec<String> = targets
                .iter()
                .map(|t| format!("{}[{}]", t.quiz.name, t.quiz.quiz_id))
                .collect();
            tracing::info!("quizzes to process ({}): {}", targets.len(), names.join(", "));
        }
        Ok(targets)
    }

    /// Run the export for one exam day.
    pub async fn run(
        &self,
        request: &ExportRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<ExportReport> {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        tracing::info!(
            "courses {:?} | day {} (tz {}) | window {} -> {}",
            request.course_ids,
            request.window.date,
            request.tz_offset,
            request.window.from,
            request.window.to
        );

        let targets = self.target_quizzes(request).await?;

        let mut course_users: HashMap<i64, Arc<Vec<Student>>> = HashMap::new();
        let mut users_per_course = BTreeMap::new();
        for &course_id in &request.course_ids {
            let users = self
                .source
                .course_users(course_id, &self.config.only_roles)
                .await?;
            tracing::info!("users in course {course_id}: {}", users.len());
            users_per_course.insert(course_id, users.len());
            course_users.insert(course_id, Arc::new(users));
        }

        let total_users: usize = users_per_course.values().sum();
        let empty_report = |pairs_total| ExportReport {
            id: run_id,
            created_at: chrono::Utc::now(),
            exam_date: request.window.date,
            tz_offset: request.tz_offset.clone(),
            quizzes: targets.clone(),
            users_per_course: users_per_course.clone(),
            pairs_total,
            pairs_failed: 0,
            rows: Vec::new(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        if total_users == 0 || targets.is_empty() {
            tracing::info!("nothing to process");
            return Ok(empty_report(0));
        }

        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut futures = FuturesUnordered::new();

        for target in &targets {
            let Some(users) = course_users.get(&target.quiz.course_id) else {
                continue;
            };
            for user in users.iter() {
                let source = Arc::clone(&self.source);
                let semaphore = Arc::clone(&semaphore);
                let quiz = target.quiz.clone();
                let area = target.area;
                let user = user.clone();
                let window = request.window;

                futures.push(async move {
                    let quiz_id = quiz.quiz_id;
                    let user_id = user.id;
                    let result = async move {
                        let _permit = semaphore
                            .acquire_owned()
                            .await
                            .map_err(|_| anyhow::anyhow!("semaphore closed"))?;
                        process_pair(source.as_ref(), &quiz, area, &user, &window).await
                    }
                    .await;
                    (quiz_id, user_id, result)
                });
            }
        }

        let total = futures.len();
        let mut rows: Vec<ResultRow> = Vec::new();
        let mut done = 0usize;
        let mut failed = 0usize;

        while let Some((quiz_id, user_id, result)) = futures.next().await {
            match result {
                Ok(pair_rows) => rows.extend(pair_rows),
                Err(e) => {
                    tracing::warn!("user {user_id} quiz {quiz_id}: {e:#}");
                    progress.on_pair_error(quiz_id, user_id, &e.to_string());
                    failed += 1;
                }
            }
            done += 1;
            if self.config.progress_every > 0 && done % self.config.progress_every == 0 {
                tracing::info!("(quiz, user) pairs processed: {done}/{total}");
            }
            progress.on_pair_complete(done, total, rows.len());
        }

        sort_rows(&mut rows);
        let elapsed = start.elapsed();
        tracing::info!("attempts inside the day: {}", rows.len());
        progress.on_export_complete(total, failed, rows.len(), elapsed);

        Ok(ExportReport {
            pairs_failed: failed,
            rows,
            duration_ms: elapsed.as_millis() as u64,
            ..empty_report(total)
        })
    }
}

/// Fetch the attempts of one user in one quiz and build a row per attempt
/// inside the exam window.
async fn process_pair(
    source: &dyn GradingSource,
    quiz: &Quiz,
    area: Area,
    user: &Student,
    window: &ExamWindow,
) -> Result<Vec<ResultRow>> {
    let attempts = source.user_attempts(quiz.quiz_id, user.id).await?;
    let mut out = Vec::new();
    for attempt in attempts.iter().filter(|a| window.contains_attempt(a)) {
        let review = source.attempt_review(attempt.id).await?;
        out.push(build_result_row(user, quiz, area, attempt, &review, window));
    }
    Ok(out)
}
