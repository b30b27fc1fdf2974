//! Configuration loading for the exporter.
//!
//! A single TOML file carries the Moodle connection, export defaults,
//! scoring rules and acta options. Every section is optional.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use admision_core::summary::ScoringConfig;
use admision_core::window::DEFAULT_TZ_OFFSET;

/// Connection settings for the Moodle REST web service.
///
/// Note: Custom Debug impl masks the token to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct MoodleSettings {
    /// Site root, e.g. `https://aulavirtual.example.edu.pe`.
    #[serde(default)]
    pub base_url: String,
    /// Web-service token.
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries for transient failures (429, 5xx, network).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay; doubles on every retry.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl std::fmt::Debug for MoodleSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MoodleSettings")
            .field("base_url", &self.base_url)
            .field("token", &"***")
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .finish()
    }
}

impl Default for MoodleSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: String::new(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl MoodleSettings {
    /// Fail unless both the site URL and the token are set.
    pub fn require_credentials(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            anyhow::bail!("Moodle base URL is not set (use [moodle].base_url or ADMISION_BASE_URL)");
        }
        if self.token.trim().is_empty() {
            anyhow::bail!("Moodle token is not set (use [moodle].token or ADMISION_TOKEN)");
        }
        Ok(())
    }
}

fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    5
}
fn default_retry_backoff_ms() -> u64 {
    200
}

/// Defaults for the `export` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSettings {
    /// Local offset of the examination day.
    #[serde(default = "default_tz_offset")]
    pub tz_offset: String,
    /// Concurrent (quiz, user) requests.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Enrolment roles to keep. Empty keeps everyone.
    #[serde(default = "default_only_roles")]
    pub only_roles: Vec<String>,
    /// Where workbooks are written when no explicit output is given.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            tz_offset: default_tz_offset(),
            workers: default_workers(),
            only_roles: default_only_roles(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_tz_offset() -> String {
    DEFAULT_TZ_OFFSET.to_string()
}
fn default_workers() -> usize {
    16
}
fn default_only_roles() -> Vec<String> {
    vec!["student".to_string()]
}

/// `~/Downloads` when it exists, otherwise the working directory.
fn default_output_dir() -> PathBuf {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join("Downloads"))
        .filter(|p| p.is_dir())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Options for the Acta/Consolidado sheets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActasSettings {
    /// Text written in the EXAMEN column.
    #[serde(default = "default_exam_label")]
    pub exam_label: String,
    /// Sede keys matched against "Sede o Filial", in priority order.
    #[serde(default = "default_sedes")]
    pub sedes: Vec<String>,
    /// Copy RESULTADOS and RESUMEN in front of the acta sheets.
    #[serde(default = "default_include_source_sheets")]
    pub include_source_sheets: bool,
}

impl Default for ActasSettings {
    fn default() -> Self {
        Self {
            exam_label: default_exam_label(),
            sedes: default_sedes(),
            include_source_sheets: default_include_source_sheets(),
        }
    }
}

fn default_exam_label() -> String {
    "EXAMEN ORDINARIO".to_string()
}
fn default_sedes() -> Vec<String> {
    vec!["CHINCHA".to_string(), "ICA".to_string()]
}
fn default_include_source_sheets() -> bool {
    true
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdmisionConfig {
    #[serde(default)]
    pub moodle: MoodleSettings,
    #[serde(default)]
    pub export: ExportSettings,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub actas: ActasSettings,
}

impl AdmisionConfig {
    /// Parse a TOML document, resolving `${VAR}` references in the Moodle section.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: AdmisionConfig = toml::from_str(content)?;
        config.moodle.base_url = resolve_env_vars(&config.moodle.base_url);
        config.moodle.token = resolve_env_vars(&config.moodle.token);
        Ok(config)
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `admision.toml` in the current directory
/// 2. `~/.config/admision/config.toml`
///
/// Environment variable overrides: `ADMISION_BASE_URL`, `ADMISION_TOKEN`.
pub fn load_config() -> Result<AdmisionConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<AdmisionConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("admision.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            AdmisionConfig::from_toml(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => AdmisionConfig::default(),
    };

    if let Ok(url) = std::env::var("ADMISION_BASE_URL") {
        config.moodle.base_url = url;
    }
    if let Ok(token) = std::env::var("ADMISION_TOKEN") {
        config.moodle.token = token;
    }

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("admision"))
}
