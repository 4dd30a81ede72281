// drumstats entry point.
//
// Startup sequence:
// 1. Parse arguments
// 2. Initialize tracing (stderr, or a log file when asked)
// 3. Load config and apply command-line overrides
// 4. Open the database
// 5. Run the import, report, map the outcome to an exit code

mod report;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use drumstats_core::config;
use drumstats_core::db::Database;
use drumstats_core::result::EtlResult;
use drumstats_etl::{open_workbook, CancelFlag, EtlPipeline};

#[derive(Parser)]
#[command(name = "drumstats", version)]
#[command(about = "Load GAA match statistics workbooks into a SQLite store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import a season workbook (.xlsx, .xls or .ods)
    Import(ImportArgs),
}

#[derive(Args)]
struct ImportArgs {
    /// Workbook to import
    workbook: PathBuf,

    /// Config file (default: config/drumstats.toml in the working directory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// SQLite database, overriding `[database] path`
    #[arg(long, value_name = "PATH")]
    db: Option<String>,

    /// Only import the KPI definitions sheet
    #[arg(long)]
    kpi_only: bool,

    /// Print the full result as JSON instead of a summary
    #[arg(long)]
    json: bool,

    /// Also write every error and warning to this CSV file
    #[arg(long, value_name = "PATH")]
    issues_csv: Option<PathBuf>,

    /// Log to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Import(args) => {
            if let Err(e) = init_tracing(args.log_file.as_deref()) {
                eprintln!("error: {e:#}");
                return ExitCode::from(2);
            }
            match import(&args) {
                Ok(result) if result.success => ExitCode::SUCCESS,
                Ok(_) => ExitCode::from(1),
                Err(e) => {
                    error!("import failed: {:#}", e);
                    eprintln!("error: {e:#}");
                    ExitCode::from(2)
                }
            }
        }
    }
}

fn import(args: &ImportArgs) -> anyhow::Result<EtlResult> {
    let mut config = match &args.config {
        Some(path) => config::load_config_file(path),
        None => config::load_config(),
    }
    .context("failed to load configuration")?;
    if let Some(db_path) = &args.db {
        config.db_path = db_path.clone();
    }
    info!(
        "Config loaded: home team {}, default competition {}",
        config.import.home_team, config.import.default_competition
    );

    ensure_parent_dir(&config.db_path)?;
    let db = Database::open(&config.db_path).context("failed to open database")?;
    info!("Database opened at {}", config.db_path);

    let workbook = open_workbook(&args.workbook)?;
    info!(
        "Workbook {} has {} sheets",
        args.workbook.display(),
        workbook.sheets().len()
    );

    let mut pipeline = EtlPipeline::new(config, &db);
    let result = if args.kpi_only {
        pipeline.run_kpi_only(&workbook)?
    } else {
        pipeline.run(&workbook, &CancelFlag::new())?
    };

    if args.json {
        println!("{}", report::to_json(&result)?);
    } else {
        print!("{}", report::summary(&result));
    }

    if let Some(path) = &args.issues_csv {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        report::write_issues_csv(&result, file)?;
        info!("Issues written to {}", path.display());
    }

    Ok(result)
}

fn ensure_parent_dir(db_path: &str) -> anyhow::Result<()> {
    if db_path == ":memory:" {
        return Ok(());
    }
    if let Some(parent) = Path::new(db_path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(())
}

/// Initialize tracing to stderr, or to `log_file` when one is given.
fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::fmt::writer::BoxMakeWriter;
    use tracing_subscriber::EnvFilter;

    let (writer, ansi) = match log_file {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)?;
            }
            let file = File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("drumstats=info,warn")),
        )
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
