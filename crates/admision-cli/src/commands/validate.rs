//! The `admision validate` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use admision_core::window::parse_tz_offset;
use admision_moodle::{load_config_from, AdmisionConfig, MoodleClient, REQUIRED_FUNCTIONS};

pub async fn execute(remote: bool, show: bool, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;

    let mut warnings = Vec::new();
    config.scoring.validate()?;
    parse_tz_offset(&config.export.tz_offset)?;
    anyhow::ensure!(config.export.workers >= 1, "export.workers must be at least 1");

    if let Err(e) = config.moodle.require_credentials() {
        warnings.push(e.to_string());
    }
    if config.actas.sedes.iter().all(|s| s.trim().is_empty()) {
        warnings.push("actas.sedes is empty; CHINCHA and ICA will be used".to_string());
    }
    if !config.export.output_dir.is_dir() {
        warnings.push(format!(
            "export.output_dir {} does not exist yet",
            config.export.output_dir.display()
        ));
    }

    println!(
        "Scoring: base nivelación threshold {:.0}%, {} area override(s)",
        config.scoring.nivelacion_threshold * 100.0,
        config.scoring.nivelacion.len()
    );
    println!(
        "Export: tz {}, {} worker(s), roles {:?}",
        config.export.tz_offset, config.export.workers, config.export.only_roles
    );

    for w in &warnings {
        println!("  WARNING: {w}");
    }

    if show {
        println!("\n{}", render_masked(&config)?);
    }

    if remote {
        config.moodle.require_credentials()?;
        let client = MoodleClient::new(&config.moodle)?;
        let info = client
            .site_info()
            .await
            .context("token check against the Moodle site failed")?;
        println!(
            "Connected to '{}' (Moodle {}) as {} ({})",
            info.sitename, info.release, info.fullname, info.username
        );
        let missing: Vec<&str> = REQUIRED_FUNCTIONS
            .iter()
            .copied()
            .filter(|f| !info.allows(f))
            .collect();
        anyhow::ensure!(
            missing.is_empty(),
            "token is not allowed to call: {}",
            missing.join(", ")
        );
        println!("Token allows all {} required functions.", REQUIRED_FUNCTIONS.len());
    }

    if warnings.is_empty() {
        println!("Configuration valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}

/// The effective configuration as TOML with the token hidden.
fn render_masked(config: &AdmisionConfig) -> Result<String> {
    let mut shown = config.clone();
    if !shown.moodle.token.is_empty() {
        shown.moodle.token = "***".to_string();
    }
    toml::to_string_pretty(&shown).context("failed to render configuration")
}
