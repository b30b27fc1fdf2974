//! admision CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "admision",
    version,
    about = "Admission exam exports from Moodle to Excel"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export one exam day to a RESULTADOS + RESUMEN workbook
    Export(ExportArgs),

    /// List the quizzes of some courses with a suggested quiz→area map
    Discover {
        /// Course ids (comma-separated, e.g. "100,101")
        #[arg(long)]
        course_ids: String,

        /// Print the quizzes as JSON
        #[arg(long)]
        json: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Render Acta Final / Consolidado sheets from an exported workbook
    Actas {
        /// Workbook with RESULTADOS and RESUMEN sheets
        #[arg(long)]
        input: PathBuf,

        /// Exam date (YYYY-MM-DD)
        #[arg(long)]
        date: String,

        /// Output workbook (default: ACTAS_<input name> next to the input)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Text for the EXAMEN column
        #[arg(long)]
        exam_label: Option<String>,

        /// Sede keys in priority order (comma-separated)
        #[arg(long)]
        sedes: Option<String>,

        /// Leave out the copies of RESULTADOS and RESUMEN
        #[arg(long)]
        no_source_sheets: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Check the configuration and optionally the Moodle token
    Validate {
        /// Also call the site and check the token's web-service functions
        #[arg(long)]
        remote: bool,

        /// Print the effective configuration (token masked)
        #[arg(long)]
        show: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create a starter admision.toml
    Init,
}

#[derive(Args)]
pub struct ExportArgs {
    /// Course ids (comma-separated, e.g. "100,101")
    #[arg(long)]
    pub course_ids: String,

    /// Quiz→area map (e.g. "11907=A,11908=B")
    #[arg(long)]
    pub quiz_map: String,

    /// Exam date (YYYY-MM-DD)
    #[arg(long)]
    pub date: String,

    /// Local offset of the exam day (default from config, "-05:00")
    #[arg(long, allow_hyphen_values = true)]
    pub tz_offset: Option<String>,

    /// Concurrent (quiz, user) requests
    #[arg(long)]
    pub workers: Option<usize>,

    /// Enrolment roles to keep (comma-separated); "all" keeps everyone
    #[arg(long)]
    pub only_roles: Option<String>,

    /// Output workbook path
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Base nivelación threshold as a fraction (e.g. 0.3)
    #[arg(long)]
    pub nivelacion_threshold: Option<f64>,

    /// Also render the Acta Final / Consolidado workbook
    #[arg(long)]
    pub actas: bool,

    /// Text for the EXAMEN column of the actas
    #[arg(long)]
    pub exam_label: Option<String>,

    /// Save the JSON run report next to the workbook
    #[arg(long)]
    pub json: bool,

    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in [
        "admision=info",
        "admision_core=info",
        "admision_moodle=info",
        "admision_report=info",
    ] {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Export(args) => commands::export::execute(args).await,
        Commands::Discover {
            course_ids,
            json,
            config,
        } => commands::discover::execute(course_ids, json, config).await,
        Commands::Actas {
            input,
            date,
            output,
            exam_label,
            sedes,
            no_source_sheets,
            config,
        } => commands::actas::execute(
            input,
            date,
            output,
            exam_label,
            sedes,
            no_source_sheets,
            config,
        ),
        Commands::Validate {
            remote,
            show,
            config,
        } => commands::validate::execute(remote, show, config).await,
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
