//! The `admision export` command.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use admision_core::engine::{ExportEngine, ExportEngineConfig, ExportRequest};
use admision_core::model::{parse_course_ids, QuizAreaMap};
use admision_core::report::ExportReport;
use admision_core::summary::summarize;
use admision_core::traits::{GradingSource, ProgressReporter};
use admision_core::window::ExamWindow;
use admision_moodle::{load_config_from, MoodleClient};
use admision_report::{write_actas, write_results_workbook, ActasOptions, SourceWorkbook};

use super::split_list;
use crate::ExportArgs;

/// Console progress reporter.
struct ConsoleReporter {
    every: usize,
}

impl ProgressReporter for ConsoleReporter {
    fn on_pair_complete(&self, done: usize, total: usize, rows: usize) {
        if done == total || (self.every > 0 && done % self.every == 0) {
            eprintln!("  Progress: {done}/{total} pairs, {rows} attempts");
        }
    }

    fn on_pair_error(&self, quiz_id: i64, user_id: i64, error: &str) {
        eprintln!("  ERROR: quiz {quiz_id} :: user {user_id}: {error}");
    }

    fn on_export_complete(&self, total: usize, failed: usize, rows: usize, elapsed: Duration) {
        eprintln!(
            "\nComplete: {total} pairs, {failed} failed, {rows} attempts ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

pub async fn execute(args: ExportArgs) -> Result<()> {
    let config = load_config_from(args.config.as_deref())?;
    tracing::debug!(moodle = ?config.moodle, "configuration loaded");

    let course_ids = parse_course_ids(&args.course_ids)?;
    anyhow::ensure!(!course_ids.is_empty(), "at least one course id is required");

    let quiz_map = QuizAreaMap::parse(&args.quiz_map);
    anyhow::ensure!(
        !quiz_map.is_empty(),
        "invalid quiz map '{}' (expected e.g. 11907=A,11908=B)",
        args.quiz_map
    );

    let tz_offset = args
        .tz_offset
        .clone()
        .unwrap_or_else(|| config.export.tz_offset.clone());
    let window = ExamWindow::parse(&args.date, &tz_offset)?;

    let mut scoring = config.scoring.clone();
    if let Some(threshold) = args.nivelacion_threshold {
        scoring.nivelacion_threshold = threshold;
    }
    scoring.validate()?;

    let workers = args.workers.unwrap_or(config.export.workers);
    anyhow::ensure!(workers >= 1, "workers must be at least 1");

    let only_roles = match args.only_roles.as_deref() {
        Some(roles) if roles.trim().eq_ignore_ascii_case("all") => Vec::new(),
        Some(roles) => split_list(roles),
        None => config.export.only_roles.clone(),
    };

    config.moodle.require_credentials()?;
    let client = MoodleClient::new(&config.moodle).context("failed to create Moodle client")?;
    let source: Arc<dyn GradingSource> = Arc::new(client);

    let engine_config = ExportEngineConfig {
        workers,
        only_roles,
        ..Default::default()
    };
    let reporter = ConsoleReporter {
        every: engine_config.progress_every,
    };
    let engine = ExportEngine::new(source, engine_config);

    let request = ExportRequest {
        course_ids,
        quiz_map,
        window,
        tz_offset,
    };

    eprintln!(
        "admision v{} — Exporting {} quiz(zes) from {} course(s) for {}",
        env!("CARGO_PKG_VERSION"),
        request.quiz_map.len(),
        request.course_ids.len(),
        request.window.date
    );
    eprintln!();

    let report = engine.run(&request, &reporter).await?;

    if report.is_empty() {
        println!(
            "No attempts found on {} for the mapped quizzes; no workbook written.",
            report.exam_date
        );
        return Ok(());
    }

    if report.pairs_failed > 0 {
        tracing::warn!(
            failed = report.pairs_failed,
            total = report.pairs_total,
            "some (quiz, user) pairs failed; their attempts are missing from the workbook"
        );
    }

    let summary = summarize(&report.rows, &scoring);
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&config.export.output_dir, &args.date));
    write_results_workbook(&output, &report.rows, &summary)
        .with_context(|| format!("failed to write workbook {}", output.display()))?;

    print_summary(&report);
    println!("Workbook written: {}", output.display());

    if args.actas {
        let source = SourceWorkbook::open(&output)?;
        let options = ActasOptions {
            exam_label: args
                .exam_label
                .clone()
                .unwrap_or_else(|| config.actas.exam_label.clone()),
            sedes: config.actas.sedes.clone(),
            include_source_sheets: config.actas.include_source_sheets,
            ..ActasOptions::new(window.date)
        };
        let actas_path = output.with_file_name(format!("ACTAS_ADMISION_{}.xlsx", window.date));
        let outcome = write_actas(&actas_path, &source, &options)
            .with_context(|| format!("failed to write actas {}", actas_path.display()))?;
        println!(
            "Actas written: {} ({} sheets)",
            actas_path.display(),
            outcome.sheets.len()
        );
    }

    if args.json {
        let path = output.with_extension("json");
        report.save_json(&path)?;
        println!("Run report saved to: {}", path.display());
    }

    Ok(())
}

fn default_output(dir: &Path, date: &str) -> PathBuf {
    dir.join(format!("RESULTADOS_ADMISION_{}.xlsx", date.trim()))
}

fn print_summary(report: &ExportReport) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["Área", "Quizzes", "Attempts", "Avg PUNTAJE"]);

    for (area, tally) in report.tally_by_area() {
        let quizzes = report.quizzes.iter().filter(|q| q.area == area).count();
        table.add_row(vec![
            Cell::new(area),
            Cell::new(quizzes),
            Cell::new(tally.attempts),
            Cell::new(format!("{:.2}", tally.avg_puntaje)),
        ]);
    }

    eprintln!("\n{table}");
}
