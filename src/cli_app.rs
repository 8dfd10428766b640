//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgGroup, Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::json;
use thiserror::Error;

use usbsweep::core::catalog::{ExtensionCatalog, ExtensionRule};
use usbsweep::logger::{ActivityEvent, ActivityLoggerHandle, start_activity_logger};
use usbsweep::platform::pal::{detect_platform, list_removable_devices};
use usbsweep::scanner::CancelToken;
use usbsweep::scanner::deletion::{DeletionConfig, DeletionEngine, DeletionReport, timed};
use usbsweep::scanner::engine::{ScanEngine, ScanReport};

/// usbsweep — removable-media threat scanner.
#[derive(Debug, Parser)]
#[command(
    name = "usbsweep",
    author,
    version,
    about = "usbsweep - Removable Media Threat Scanner",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override extension catalog path.
    #[arg(long, global = true, value_name = "PATH")]
    catalog: Option<PathBuf>,
    /// Append activity events to a JSONL log file.
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// List removable drives currently attached.
    Devices,
    /// Scan a drive for files matching the extension catalog.
    Scan(ScanArgs),
    /// Delete flagged files from a drive.
    Clean(CleanArgs),
    /// Inspect and edit the extension catalog.
    Catalog(CatalogArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct ScanArgs {
    /// Directory root to scan. Defaults to the first removable drive.
    #[arg(value_name = "ROOT")]
    root: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
#[command(group(ArgGroup::new("target").required(true).args(["all", "shortcuts", "paths"])))]
struct CleanArgs {
    /// Directory root to scan. Defaults to the first removable drive.
    #[arg(value_name = "ROOT")]
    root: Option<PathBuf>,
    /// Delete every flagged file.
    #[arg(long)]
    all: bool,
    /// Delete only Windows shell shortcuts (.lnk).
    #[arg(long)]
    shortcuts: bool,
    /// Delete only these flagged paths.
    #[arg(long, value_name = "PATH", num_args = 1..)]
    paths: Vec<PathBuf>,
    /// Report what would be deleted without touching disk.
    #[arg(long)]
    dry_run: bool,
    /// Skip interactive confirmation prompt.
    #[arg(short, long)]
    yes: bool,
}

#[derive(Debug, Clone, Args)]
struct CatalogArgs {
    #[command(subcommand)]
    command: CatalogCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum CatalogCommand {
    /// Print every catalog rule with its index.
    List,
    /// Add a rule and persist the catalog.
    Add {
        /// Extension pattern, with leading dot (e.g. ".scr").
        pattern: String,
        /// Human-readable description.
        #[arg(default_value = "")]
        description: String,
    },
    /// Remove the rule at an index and persist the catalog.
    Remove {
        /// Zero-based index as shown by `catalog list`.
        index: usize,
    },
    /// Replace the rule at an index and persist the catalog.
    Edit {
        /// Zero-based index as shown by `catalog list`.
        index: usize,
        /// New extension pattern, with leading dot.
        pattern: String,
        /// New description.
        #[arg(default_value = "")]
        description: String,
    },
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Operation partially succeeded.
    #[error("{0}")]
    Partial(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
            Self::Partial(_) => 4,
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Devices => run_devices(cli),
        Command::Scan(args) => run_scan(cli, args),
        Command::Clean(args) => run_clean(cli, args),
        Command::Catalog(args) => run_catalog(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn run_devices(cli: &Cli) -> Result<(), CliError> {
    let platform = detect_platform().map_err(|e| CliError::Runtime(e.to_string()))?;
    let devices =
        list_removable_devices(platform.as_ref()).map_err(|e| CliError::Runtime(e.to_string()))?;

    match output_mode(cli) {
        OutputMode::Human => {
            if devices.is_empty() {
                println!("No removable drives attached.");
                return Ok(());
            }
            println!("{}", "Removable drives".bold());
            for drive in &devices {
                println!(
                    "  {}  ({}, {})",
                    drive.root.display().to_string().cyan(),
                    drive.device,
                    drive.fs_type,
                );
            }
        }
        OutputMode::Json => {
            let payload = json!({ "devices": devices });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
    }
    Ok(())
}

fn run_scan(cli: &Cli, args: &ScanArgs) -> Result<(), CliError> {
    let catalog = open_catalog(cli)?;
    let logger = cli.log_file.clone().map(|p| start_activity_logger(Some(p)));
    let report = scan_target(cli, args.root.as_deref(), &catalog, logger.clone())?;
    print_scan_report(cli, &report)?;
    shutdown(logger);
    Ok(())
}

fn run_clean(cli: &Cli, args: &CleanArgs) -> Result<(), CliError> {
    let catalog = open_catalog(cli)?;
    let logger = cli.log_file.clone().map(|p| start_activity_logger(Some(p)));
    let report = scan_target(cli, args.root.as_deref(), &catalog, logger.clone())?;

    let mut flagged = report.flagged.clone();
    if flagged.is_empty() {
        if output_mode(cli) == OutputMode::Human {
            println!("Nothing flagged on {}.", report.drive_root.display());
        } else {
            let payload = json!({ "deleted": [], "duration_ms": 0 });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        shutdown(logger);
        return Ok(());
    }

    if !args.dry_run && !args.yes {
        confirm_deletion(flagged.len())?;
    }

    let engine = DeletionEngine::new(DeletionConfig { dry_run: args.dry_run }, logger.clone());
    let cancel = CancelToken::new();
    let (deletion, elapsed) = timed(|| {
        if args.shortcuts {
            engine.delete_shortcuts(&mut flagged, &cancel)
        } else if !args.paths.is_empty() {
            engine.delete_selected(&mut flagged, &args.paths, &cancel)
        } else {
            engine.delete_all(&mut flagged, &cancel)
        }
    });

    print_deletion_report(cli, &deletion, elapsed)?;
    shutdown(logger);

    if !deletion.failures.is_empty() {
        return Err(CliError::Partial(format!(
            "{} of {} deletions failed",
            deletion.failures.len(),
            deletion.failures.len() + deletion.deleted.len(),
        )));
    }
    Ok(())
}

fn run_catalog(cli: &Cli, args: &CatalogArgs) -> Result<(), CliError> {
    let mut catalog = open_catalog(cli)?;

    match &args.command {
        CatalogCommand::List => return print_catalog(cli, &catalog),
        CatalogCommand::Add {
            pattern,
            description,
        } => {
            let rule = ExtensionRule::new(pattern.clone(), description.clone())
                .map_err(|e| CliError::User(e.to_string()))?;
            catalog.add_rule(rule);
        }
        CatalogCommand::Remove { index } => {
            catalog
                .remove_rule(*index)
                .map_err(|e| CliError::User(e.to_string()))?;
        }
        CatalogCommand::Edit {
            index,
            pattern,
            description,
        } => {
            let rule = ExtensionRule::new(pattern.clone(), description.clone())
                .map_err(|e| CliError::User(e.to_string()))?;
            catalog
                .edit_rule(*index, rule)
                .map_err(|e| CliError::User(e.to_string()))?;
        }
    }

    catalog.save().map_err(|e| CliError::Runtime(e.to_string()))?;
    if let Some(logger) = cli.log_file.clone().map(|p| start_activity_logger(Some(p))) {
        logger.send(ActivityEvent::CatalogSaved {
            path: catalog.path().to_string_lossy().to_string(),
            rules: catalog.len() as u64,
        });
        logger.shutdown();
    }
    print_catalog(cli, &catalog)
}

// -- helpers ------------------------------------------------------------------

fn open_catalog(cli: &Cli) -> Result<ExtensionCatalog, CliError> {
    ExtensionCatalog::open(cli.catalog.as_deref()).map_err(|e| CliError::Runtime(e.to_string()))
}

/// Resolve the scan root: an explicit path, or the first removable drive.
fn scan_target(
    cli: &Cli,
    root: Option<&std::path::Path>,
    catalog: &ExtensionCatalog,
    logger: Option<ActivityLoggerHandle>,
) -> Result<ScanReport, CliError> {
    let platform = detect_platform().map_err(|e| CliError::Runtime(e.to_string()))?;
    let engine = ScanEngine::new(Arc::clone(&platform), logger);
    let cancel = CancelToken::new();

    if let Some(root) = root {
        if !root.is_dir() {
            return Err(CliError::User(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        return Ok(engine.scan_root(root, catalog, &cancel));
    }

    let devices =
        list_removable_devices(platform.as_ref()).map_err(|e| CliError::Runtime(e.to_string()))?;
    let Some(drive) = devices.first() else {
        return Err(CliError::User(
            "no removable drive attached; pass an explicit ROOT".to_string(),
        ));
    };
    if output_mode(cli) == OutputMode::Human {
        println!("Scanning {} ...", drive.root.display());
    }
    Ok(engine.scan(drive, catalog, &cancel))
}

fn confirm_deletion(count: usize) -> Result<(), CliError> {
    if !io::stdin().is_terminal() {
        return Err(CliError::User(
            "refusing to delete without confirmation; use --yes".to_string(),
        ));
    }
    print!("Delete {count} flagged file(s)? [y/N] ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .map_err(|e| CliError::Runtime(e.to_string()))?;
    match input.trim().to_lowercase().as_str() {
        "y" | "yes" => Ok(()),
        _ => Err(CliError::User("aborted".to_string())),
    }
}

fn print_scan_report(cli: &Cli, report: &ScanReport) -> Result<(), CliError> {
    match output_mode(cli) {
        OutputMode::Human => {
            println!(
                "Scanned {}: {} files, {} flagged ({} ms)",
                report.drive_root.display(),
                report.stats.files_seen,
                report.stats.flagged,
                report.stats.duration.as_millis(),
            );
            for record in report.flagged.iter() {
                println!(
                    "  {}  {} ({})",
                    record.path.display().to_string().red(),
                    record.extension,
                    format_bytes(record.size_bytes),
                );
            }
            for diag in &report.diagnostics {
                println!(
                    "  {} {}: {}",
                    "warning:".yellow(),
                    diag.path.display(),
                    diag.message,
                );
            }
            if report.cancelled {
                println!("{}", "Scan was cancelled before completion.".yellow());
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "root": report.drive_root,
                "files_seen": report.stats.files_seen,
                "flagged": report.flagged.records(),
                "diagnostics": report.diagnostics,
                "duration_ms": report.stats.duration.as_millis() as u64,
                "cancelled": report.cancelled,
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
    }
    Ok(())
}

fn print_deletion_report(
    cli: &Cli,
    report: &DeletionReport,
    elapsed: Duration,
) -> Result<(), CliError> {
    match output_mode(cli) {
        OutputMode::Human => {
            let verb = if report.dry_run { "Would delete" } else { "Deleted" };
            println!(
                "{verb} {} file(s), {} freed ({} ms)",
                report.deleted.len(),
                format_bytes(report.bytes_freed),
                elapsed.as_millis(),
            );
            for path in &report.deleted {
                println!("  {}", path.display());
            }
            for diag in &report.failures {
                println!(
                    "  {} {}: {}",
                    "failed:".red(),
                    diag.path.display(),
                    diag.message,
                );
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "deleted": report.deleted,
                "failures": report.failures,
                "bytes_freed": report.bytes_freed,
                "dry_run": report.dry_run,
                "cancelled": report.cancelled,
                "duration_ms": elapsed.as_millis() as u64,
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
    }
    Ok(())
}

fn print_catalog(cli: &Cli, catalog: &ExtensionCatalog) -> Result<(), CliError> {
    match output_mode(cli) {
        OutputMode::Human => {
            println!("{} ({})", "Extension catalog".bold(), catalog.path().display());
            for (i, rule) in catalog.rules().iter().enumerate() {
                println!("  [{i}] {}  {}", rule.pattern.cyan(), rule.description);
            }
        }
        OutputMode::Json => {
            let payload = json!({ "path": catalog.path(), "rules": catalog.rules() });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
    }
    Ok(())
}

fn shutdown(logger: Option<ActivityLoggerHandle>) {
    if let Some(logger) = logger {
        logger.shutdown();
    }
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("USBSWEEP_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[0])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
