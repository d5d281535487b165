use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use macro_replay::config::{BrowserEngine, EnvironmentFile, RunOverrides};
use macro_replay::report::{assemble_report, junit, Report};
use macro_replay::store::{MacroCatalog, MacroFile, MemoryStore, RunStore, SqliteStore};
use macro_replay::{ChromeDriver, MacroId, ReplayError, RunController, RunId, RunStatus};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// Exit code of a run that finished with FAIL
const EXIT_RUN_FAILED: u8 = 1;
/// Exit code of configuration, launch and other process-level errors
const EXIT_PROCESS_ERROR: u8 = 2;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a macro against an environment
    Replay(ReplayArgs),
    /// Regenerate the reports of a finished run from storage
    Report {
        run_id: i64,
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        report_json: Option<PathBuf>,
        #[arg(long)]
        junit: Option<PathBuf>,
    },
    /// Import a recorded macro file into the database
    Import {
        file: PathBuf,
        #[arg(long)]
        db: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// Macro id in the database (not needed with --macro-file)
    macro_id: Option<i64>,

    /// Environment name
    #[arg(long, env = "MACRO_ENV")]
    env: String,

    #[arg(long, default_value = "environments.json")]
    env_file: PathBuf,

    /// SQLite database holding macros and runs
    #[arg(long, conflicts_with = "macro_file", required_unless_present = "macro_file")]
    db: Option<PathBuf>,

    /// Replay a recorded macro file without a database
    #[arg(long)]
    macro_file: Option<PathBuf>,

    #[arg(long)]
    base_url: Option<String>,

    #[arg(long)]
    browser: Option<BrowserEngine>,

    #[arg(long)]
    headless: Option<bool>,

    /// Element wait per step in milliseconds
    #[arg(long)]
    step_timeout: Option<u64>,

    /// Navigation timeout in milliseconds
    #[arg(long)]
    global_timeout: Option<u64>,

    #[arg(long)]
    stop_on_fail: Option<bool>,

    #[arg(long)]
    artifacts_dir: Option<PathBuf>,

    /// JSON report path (default: <artifacts-dir>/run-<id>/report.json)
    #[arg(long)]
    report_json: Option<PathBuf>,

    #[arg(long)]
    junit: Option<PathBuf>,

    /// Custom Chrome executable
    #[arg(long)]
    chrome_path: Option<String>,

    /// Disable the Chrome sandbox (needed in some containers)
    #[arg(long)]
    no_sandbox: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Replay(args) => replay(args).await,
        Command::Report {
            run_id,
            db,
            report_json,
            junit,
        } => regenerate_report(RunId(run_id), &db, report_json, junit).await,
        Command::Import { file, db } => import(&file, &db).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_PROCESS_ERROR)
        }
    }
}

async fn replay(args: ReplayArgs) -> anyhow::Result<ExitCode> {
    let environments = EnvironmentFile::load(&args.env_file).await?;
    let config = environments.resolve(
        &args.env,
        RunOverrides {
            base_url: args.base_url,
            browser: args.browser,
            headless: args.headless,
            step_timeout_ms: args.step_timeout,
            global_timeout_ms: args.global_timeout,
            stop_on_fail: args.stop_on_fail,
            artifacts_dir: args.artifacts_dir,
        },
    )?;

    let (store, macro_id): (Arc<dyn RunStore>, MacroId) = match (&args.macro_file, &args.db) {
        (Some(path), _) => {
            let store = Arc::new(MemoryStore::new());
            let macro_id = MacroFile::load(path).await?.import_into(store.as_ref()).await?;
            let store: Arc<dyn RunStore> = store;
            (store, macro_id)
        }
        (None, Some(db)) => {
            let macro_id = args.macro_id.map(MacroId).ok_or_else(|| {
                ReplayError::Configuration("a macro id is required with --db".to_string())
            })?;
            let store: Arc<dyn RunStore> = Arc::new(SqliteStore::open(db)?);
            (store, macro_id)
        }
        (None, None) => {
            return Err(ReplayError::Configuration(
                "either --db or --macro-file is required".to_string(),
            )
            .into())
        }
    };

    // Fail on a missing macro before paying for a browser launch
    if store.get_macro(macro_id).await?.is_none() {
        return Err(ReplayError::MacroNotFound(macro_id).into());
    }

    let driver = ChromeDriver::for_run(&config, args.chrome_path, args.no_sandbox)
        .await
        .map_err(ReplayError::Launch)?;

    let artifacts_dir = config.artifacts_dir.clone();
    let controller = RunController::new(store.clone(), config);
    let outcome = controller.replay(macro_id, Box::new(driver)).await?;

    let report = assemble_report(store.as_ref(), outcome.run_id).await?;
    let report_json = args.report_json.unwrap_or_else(|| {
        artifacts_dir
            .join(format!("run-{}", outcome.run_id))
            .join("report.json")
    });
    write_reports(&report, &report_json, args.junit.as_deref()).await?;

    if let Some(step) = report.first_failure() {
        eprintln!(
            "Run {} FAILED at step {} ({}): {}",
            report.run_id,
            step.order_index,
            step.action_type,
            step.error_message.as_deref().unwrap_or("step failed")
        );
    }

    Ok(exit_code(outcome.status))
}

async fn regenerate_report(
    run_id: RunId,
    db: &Path,
    report_json: Option<PathBuf>,
    junit_path: Option<PathBuf>,
) -> anyhow::Result<ExitCode> {
    let store = SqliteStore::open(db)?;
    let report = assemble_report(&store, run_id).await?;

    match &report_json {
        Some(path) => write_reports(&report, path, junit_path.as_deref()).await?,
        None => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            if let Some(path) = &junit_path {
                junit::write(&report, path).await?;
            }
        }
    }

    Ok(exit_code(report.status))
}

async fn import(file: &Path, db: &Path) -> anyhow::Result<ExitCode> {
    let macro_file = MacroFile::load(file).await?;
    let store = SqliteStore::open(db)?;
    let catalog: &dyn MacroCatalog = &store;
    let macro_id = macro_file
        .import_into(catalog)
        .await
        .with_context(|| format!("Failed to import {}", file.display()))?;

    println!("{}", macro_id);
    Ok(ExitCode::SUCCESS)
}

async fn write_reports(report: &Report, json: &Path, junit_path: Option<&Path>) -> anyhow::Result<()> {
    report.to_file(json).await?;
    if let Some(path) = junit_path {
        junit::write(report, path).await?;
    }
    Ok(())
}

fn exit_code(status: RunStatus) -> ExitCode {
    match status {
        RunStatus::Pass => ExitCode::SUCCESS,
        RunStatus::Fail | RunStatus::Running => ExitCode::from(EXIT_RUN_FAILED),
    }
}
