//! mysql-bulk-migrate CLI - bulk MySQL export/import driven by a credentials spreadsheet.

mod prompt;

use clap::{Parser, Subcommand};
use mysql_bulk_migrate::error::EXIT_FAILURE;
use mysql_bulk_migrate::{
    load_credentials, write_sample_workbook, Config, MigrateError, Orchestrator, RunLog, RunMode,
    RunPlan, RunReport,
};
use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Default output of `init`.
const SAMPLE_FILE: &str = "database_credentials_SAMPLE.xlsx";

#[derive(Parser)]
#[command(name = "mysql-bulk-migrate")]
#[command(about = "Bulk export and import of MySQL databases from a credentials spreadsheet")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Credentials spreadsheet [default: database_credentials.xlsx]
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// Backup directory [default: backups]
    #[arg(long)]
    backup_dir: Option<PathBuf>,

    /// Directory for run log files [default: logs]
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump every database listed in the credentials spreadsheet
    Export {
        /// List the databases that would be dumped without running mysqldump
        #[arg(long)]
        dry_run: bool,

        /// Per-database dump timeout in seconds [default: 300]
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Create databases and users, then restore the newest backup of each
    Import {
        /// Show which backup each database would get without touching the server
        #[arg(long)]
        dry_run: bool,

        /// Per-attempt restore timeout in seconds [default: 600]
        #[arg(long)]
        timeout: Option<u64>,

        /// Administrator host [default: localhost]
        #[arg(long)]
        admin_host: Option<String>,

        /// Administrator user [default: root]
        #[arg(long)]
        admin_user: Option<String>,
    },

    /// Write a sample credentials spreadsheet
    Init {
        /// Output path [default: database_credentials_SAMPLE.xlsx]
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file without asking
        #[arg(long, short)]
        force: bool,
    },
}

impl Commands {
    fn mode(&self) -> Option<RunMode> {
        match self {
            Commands::Export { .. } => Some(RunMode::Export),
            Commands::Import { .. } => Some(RunMode::Import),
            Commands::Init { .. } => None,
        }
    }

    fn dry_run(&self) -> bool {
        match self {
            Commands::Export { dry_run, .. } | Commands::Import { dry_run, .. } => *dry_run,
            Commands::Init { .. } => false,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_FAILURE),
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

/// Returns whether the run fully succeeded.
async fn run() -> Result<bool, MigrateError> {
    let cli = Cli::parse();

    // Init doesn't need configuration or logging
    let Some(mode) = cli.command.mode() else {
        if let Commands::Init { output, force } = &cli.command {
            let path = output.clone().unwrap_or_else(|| PathBuf::from(SAMPLE_FILE));
            prompt::confirm_overwrite(&path, *force)?;
            write_sample_workbook(&path)?;
            println!("Sample credentials file created: {}", path.display());
            println!("Columns: database_name | username | password | host (blank host = localhost)");
            println!("Fill it in and save it as database_credentials.xlsx");
        }
        return Ok(true);
    };

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = load_config(&cli)?;
    info!("Credentials file: {}", config.credentials_file.display());

    let log = if cli.command.dry_run() {
        RunLog::in_memory()
    } else {
        RunLog::create(&config.log_dir, mode, config.logging.flush_every)
    };

    let result = execute(&cli, config, log.clone()).await;
    match &result {
        Ok(_) => {}
        Err(MigrateError::Cancelled) => log.warning("Run interrupted by user"),
        Err(e) => log.error(e.to_string()),
    }
    if let Err(e) = log.flush() {
        warn!("Failed to write run log: {}", e);
    }

    result
}

/// Config file (if any), then command-line overrides.
fn load_config(cli: &Cli) -> Result<Config, MigrateError> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(path) = &cli.credentials {
        config.credentials_file = path.clone();
    }
    if let Some(dir) = &cli.backup_dir {
        config.backup_dir = dir.clone();
    }
    if let Some(dir) = &cli.log_dir {
        config.log_dir = dir.clone();
    }
    match &cli.command {
        Commands::Export {
            timeout: Some(secs),
            ..
        } => config.timeouts.dump_secs = *secs,
        Commands::Import {
            timeout: Some(secs),
            ..
        } => config.timeouts.restore_secs = *secs,
        _ => {}
    }

    config.validate()?;
    Ok(config)
}

async fn execute(cli: &Cli, config: Config, log: RunLog) -> Result<bool, MigrateError> {
    let records = load_credentials(&config.credentials_file)?;
    log.info(format!(
        "Read {} databases from {}",
        records.len(),
        config.credentials_file.display()
    ));

    let admin_config = config.admin.clone();
    let orchestrator = Orchestrator::new(config, log);

    match &cli.command {
        Commands::Export { dry_run: true, .. } => {
            print_plan(&orchestrator.plan(RunMode::Export, &records), cli.output_json)?;
            Ok(true)
        }
        Commands::Export { .. } => {
            let report = interruptible(orchestrator.export(&records)).await?;
            print_report(&report, cli.output_json)?;
            Ok(report.is_success())
        }
        Commands::Import { dry_run: true, .. } => {
            orchestrator.ensure_backup_dir()?;
            let plan = orchestrator.plan(RunMode::Import, &records);
            print_plan(&plan, cli.output_json)?;
            Ok(true)
        }
        Commands::Import {
            admin_host,
            admin_user,
            ..
        } => {
            // Fail on a missing backup directory before asking for a password.
            orchestrator.ensure_backup_dir()?;
            let admin = prompt::admin_credential(
                admin_config.as_ref(),
                admin_host.clone(),
                admin_user.clone(),
            )?;
            let report = interruptible(orchestrator.import(&records, &admin)).await?;
            print_report(&report, cli.output_json)?;
            Ok(report.is_success())
        }
        Commands::Init { .. } => Ok(true),
    }
}

/// Race a run against SIGINT/SIGTERM. Dropping the run kills its child process.
async fn interruptible<F, T>(work: F) -> Result<T, MigrateError>
where
    F: Future<Output = Result<T, MigrateError>>,
{
    tokio::select! {
        result = work => result,
        _ = shutdown_signal() => {
            eprintln!("\nReceived interrupt. Stopping after killing the running process...");
            Err(MigrateError::Cancelled)
        }
    }
}

async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Resolves on SIGINT (Ctrl-C) or SIGTERM.
#[cfg(unix)]
async fn shutdown_signal() {
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(_) => ctrl_c().await,
    }
}

/// Resolves on Ctrl-C.
#[cfg(not(unix))]
async fn shutdown_signal() {
    ctrl_c().await
}

fn print_report(report: &RunReport, json: bool) -> Result<(), MigrateError> {
    if json {
        println!("{}", report.to_json()?);
        return Ok(());
    }

    let verb = match report.mode {
        RunMode::Export => "Export",
        RunMode::Import => "Import",
    };
    println!("\n{} {}!", verb, report.status);
    println!("  Run ID: {}", report.run_id);
    println!("  Duration: {:.2}s", report.duration_seconds);
    println!(
        "  Databases: {}/{} succeeded",
        report.stats.successful, report.stats.total
    );
    println!("  Failed: {}", report.stats.failed);
    if report.mode == RunMode::Import {
        println!("  Skipped: {}", report.stats.skipped);
    }
    if !report.failed_databases().is_empty() {
        println!("  Failed databases: {:?}", report.failed_databases());
    }
    if !report.skipped_databases().is_empty() {
        println!("  Skipped databases: {:?}", report.skipped_databases());
    }
    if let Some(path) = &report.log_file {
        println!("  Log file: {}", path.display());
    }
    Ok(())
}

fn print_plan(plan: &RunPlan, json: bool) -> Result<(), MigrateError> {
    if json {
        println!("{}", plan.to_json()?);
        return Ok(());
    }

    println!("Dry run: {} of {} databases", plan.mode, plan.databases.len());
    println!("  Backup directory: {}", plan.backup_dir.display());
    for planned in &plan.databases {
        match (plan.mode, &planned.artifact) {
            (RunMode::Export, _) => println!("  dump    {}", planned.database),
            (RunMode::Import, Some(path)) => {
                println!("  restore {} <- {}", planned.database, path.display())
            }
            (RunMode::Import, None) => {
                println!("  skip    {} (no backup file found)", planned.database)
            }
        }
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Console logs go to stderr so --output-json keeps stdout clean
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
