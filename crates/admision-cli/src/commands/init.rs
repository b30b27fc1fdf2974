//! The `admision init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    let path = std::path::Path::new("admision.toml");
    if path.exists() {
        println!("admision.toml already exists, skipping.");
    } else {
        std::fs::write(path, SAMPLE_CONFIG)?;
        println!("Created admision.toml");
    }

    println!("\nNext steps:");
    println!("  1. Set ADMISION_TOKEN (or edit [moodle] in admision.toml)");
    println!("  2. Run: admision validate --remote");
    println!("  3. Run: admision discover --course-ids 100,101");
    println!("  4. Run: admision export --course-ids 100,101 --quiz-map 11907=A --date 2025-03-09");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# admision configuration

[moodle]
base_url = "https://aulavirtual.example.edu.pe"
token = "${ADMISION_TOKEN}"
timeout_secs = 60
max_retries = 5
retry_backoff_ms = 200

[export]
tz_offset = "-05:00"
workers = 16
only_roles = ["student"]
# output_dir = "/home/me/Downloads"

[scoring]
# Fraction of a subject's weight below which nivelación is required.
nivelacion_threshold = 0.30

# Per-area weight overrides (defaults to the subject's question count).
# [scoring.criteria.A]
# matematica = 30.0

# Per-area, per-subject threshold overrides.
# [scoring.nivelacion.C]
# cta_ccss = 0.25

[actas]
exam_label = "EXAMEN ORDINARIO"
sedes = ["CHINCHA", "ICA"]
include_source_sheets = true
"#;
