//! The `admision discover` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;

use admision_core::model::{guess_area_from_name, parse_course_ids, Area, Quiz, QuizAreaMap};
use admision_core::traits::GradingSource;
use admision_moodle::{load_config_from, MoodleClient};

/// One discovered quiz with its guessed area.
#[derive(Debug, Serialize)]
struct DiscoveredQuiz {
    course_id: i64,
    quiz_id: i64,
    name: String,
    suggested_area: Option<Area>,
}

pub async fn execute(course_ids: String, json: bool, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let course_ids = parse_course_ids(&course_ids)?;
    anyhow::ensure!(!course_ids.is_empty(), "at least one course id is required");

    config.moodle.require_credentials()?;
    let client = MoodleClient::new(&config.moodle).context("failed to create Moodle client")?;
    let quizzes = client.discover_quizzes(&course_ids).await?;

    let discovered: Vec<DiscoveredQuiz> = quizzes.into_iter().map(with_guess).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&discovered)?);
        return Ok(());
    }

    if discovered.is_empty() {
        println!("No quizzes found in courses {course_ids:?}.");
        return Ok(());
    }

    print_table(&discovered);

    let suggested = suggested_map(&discovered);
    if suggested.is_empty() {
        println!("\nNo area could be guessed; write the quiz map by hand (A/B/C).");
    } else {
        println!("\nSuggested quiz map (review before use):");
        println!("  --quiz-map {suggested}");
    }

    Ok(())
}

fn with_guess(quiz: Quiz) -> DiscoveredQuiz {
    DiscoveredQuiz {
        suggested_area: guess_area_from_name(&quiz.name),
        course_id: quiz.course_id,
        quiz_id: quiz.quiz_id,
        name: quiz.name,
    }
}

fn suggested_map(quizzes: &[DiscoveredQuiz]) -> QuizAreaMap {
    QuizAreaMap(
        quizzes
            .iter()
            .filter_map(|q| q.suggested_area.map(|a| (q.quiz_id, a)))
            .collect(),
    )
}

fn print_table(quizzes: &[DiscoveredQuiz]) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["Course", "Quiz ID", "Name", "Suggested área"]);
    for q in quizzes {
        table.add_row(vec![
            Cell::new(q.course_id),
            Cell::new(q.quiz_id),
            Cell::new(&q.name),
            Cell::new(q.suggested_area.map(|a| a.to_string()).unwrap_or_default()),
        ]);
    }
    println!("Quizzes found ({}):\n{table}", quizzes.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz(id: i64, name: &str) -> Quiz {
        Quiz {
            course_id: 100,
            quiz_id: id,
            name: name.to_string(),
        }
    }

    #[test]
    fn suggests_only_guessed_areas() {
        let discovered: Vec<DiscoveredQuiz> = vec![
            quiz(11907, "Examen de Admisión – Ingenierías"),
            quiz(11908, "Examen Ciencias de la Salud"),
            quiz(11909, "Práctica libre"),
            quiz(11910, "Ciencias Humanas"),
        ]
        .into_iter()
        .map(with_guess)
        .collect();

        assert_eq!(discovered[2].suggested_area, None);
        assert_eq!(
            suggested_map(&discovered).to_string(),
            "11907=A,11908=B,11910=C"
        );
    }
}
