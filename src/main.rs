//! tidyvault - snapshot catalog, duplicate finder and reversible cleanup.
//!
//! Usage:
//!   tidyvault scan PATH...              Catalog files into a new snapshot
//!   tidyvault largest                   Largest files of the latest snapshot
//!   tidyvault duplicates                Find duplicate files
//!   tidyvault plan --mode duplicates    Plan a cleanup (nothing is touched)
//!   tidyvault execute ID --yes          Quarantine the planned files
//!   tidyvault undo ID                   Put them back
//!   tidyvault --help                    Show help

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{bail, eyre, Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use tidyvault_core::{ActionId, CleanupAction, CleanupMode, RestoreOutcome, Snapshot, SnapshotId};
use tidyvault_ops::{Engine, EngineConfig, Request, Response};

#[derive(Parser)]
#[command(
    name = "tidyvault",
    version,
    about = "Find wasted disk space and clean it up reversibly",
    long_about = "tidyvault catalogs files into snapshots, reports where space goes, \
                  finds duplicates, and removes files through a quarantine so every \
                  cleanup can be undone.\n\n\
                  Logging is controlled with the TIDYVAULT_LOG environment variable."
)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Keep the catalog and quarantine under this directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan directories into a new snapshot
    Scan {
        /// Roots to scan
        #[arg(required = true)]
        roots: Vec<PathBuf>,

        /// Follow symbolic links
        #[arg(short = 'L', long)]
        follow_symlinks: bool,

        /// Include hidden files and directories
        #[arg(short = 'H', long)]
        hidden: bool,
    },

    /// List snapshots
    Snapshots,

    /// Show the largest files
    Largest {
        #[command(flatten)]
        target: Target,

        #[arg(short = 'n', long, default_value = "20")]
        top: usize,
    },

    /// Show the directories holding the most data
    Folders {
        #[command(flatten)]
        target: Target,

        #[arg(short = 'n', long, default_value = "20")]
        top: usize,
    },

    /// Show the most common extensions
    Extensions {
        #[command(flatten)]
        target: Target,

        #[arg(short = 'n', long, default_value = "20")]
        top: usize,
    },

    /// Show usage per file category
    Categories {
        #[command(flatten)]
        target: Target,
    },

    /// Show how concentrated space is in few files
    Pareto {
        #[command(flatten)]
        target: Target,

        #[arg(short, long, default_value = "10")]
        points: usize,
    },

    /// Show file counts per size decade
    Histogram {
        #[command(flatten)]
        target: Target,
    },

    /// Compare two snapshots of the same roots
    Growth { base: i64, current: i64 },

    /// Find duplicate files
    Duplicates {
        #[command(flatten)]
        target: Target,

        /// Maximum number of clusters to show
        #[arg(short = 'n', long, default_value = "20")]
        top: usize,
    },

    /// Plan a cleanup without touching any file
    Plan {
        #[command(flatten)]
        target: Target,

        #[arg(short, long)]
        mode: PlanMode,

        /// Restrict the cleanup to these roots (defaults to the snapshot's)
        #[arg(short, long = "root")]
        roots: Vec<PathBuf>,

        /// Minimum size for large-old (e.g. "500MB")
        #[arg(long, default_value = "100MB")]
        min_size: String,

        /// Minimum age in days for large-old
        #[arg(long, default_value = "180")]
        older_than: u32,

        /// Files for explicit mode
        #[arg(long = "path")]
        paths: Vec<PathBuf>,

        /// Accept high risk files instead of setting them aside
        #[arg(long)]
        force: bool,
    },

    /// Execute a planned cleanup
    Execute {
        action: i64,

        /// Confirm that files should be removed
        #[arg(long)]
        yes: bool,

        /// Delete files outright instead of quarantining them
        #[arg(long)]
        no_quarantine: bool,
    },

    /// Restore the files of an executed cleanup
    Undo { action: i64 },

    /// Show one cleanup action
    Action { action: i64 },

    /// List cleanup actions
    Actions,

    /// Delete quarantined files older than the retention period
    Purge,
}

/// Which snapshot to analyze.
#[derive(clap::Args)]
struct Target {
    /// Snapshot id (defaults to the latest finalized snapshot)
    #[arg(short, long)]
    snapshot: Option<i64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PlanMode {
    Duplicates,
    LargeOld,
    LogsTemp,
    Explicit,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("TIDYVAULT_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let engine = open_engine(&cli)?;
    let clusters_shown = match &cli.command {
        Command::Duplicates { top, .. } => *top,
        _ => usize::MAX,
    };
    let request = build_request(&engine, cli.command)?;

    let cancel = CancellationToken::new();
    if matches!(request, Request::Scan { .. }) {
        report_progress(&engine);
    }
    let response = engine.handle(request, &cancel)?;

    match cli.format {
        OutputFormat::Text => render(&response, clusters_shown),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
    }
    Ok(())
}

fn open_engine(cli: &Cli) -> Result<Engine> {
    let path = cli.config.clone().or_else(EngineConfig::default_path);
    let mut config = match path {
        Some(path) => {
            debug!("Loading configuration from {}", path.display());
            EngineConfig::load(&path)
                .with_context(|| format!("Invalid configuration {}", path.display()))?
        }
        None => EngineConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config = config.with_data_dir(dir);
    }
    Engine::open(config).context("Cannot open catalog")
}

fn build_request(engine: &Engine, command: Command) -> Result<Request> {
    let request = match command {
        Command::Scan {
            roots,
            follow_symlinks,
            hidden,
        } => Request::Scan {
            roots,
            follow_symlinks,
            include_hidden: hidden,
        },
        Command::Snapshots => Request::ListSnapshots,
        Command::Largest { target, top } => Request::LargestFiles {
            snapshot_id: resolve(engine, &target)?,
            limit: top,
        },
        Command::Folders { target, top } => Request::FolderRollup {
            snapshot_id: resolve(engine, &target)?,
            limit: top,
        },
        Command::Extensions { target, top } => Request::ExtensionFrequency {
            snapshot_id: resolve(engine, &target)?,
            limit: top,
        },
        Command::Categories { target } => Request::CategoryDistribution {
            snapshot_id: resolve(engine, &target)?,
        },
        Command::Pareto { target, points } => Request::ParetoCurve {
            snapshot_id: resolve(engine, &target)?,
            points,
        },
        Command::Histogram { target } => Request::SizeHistogram {
            snapshot_id: resolve(engine, &target)?,
        },
        Command::Growth { base, current } => Request::Growth {
            base: SnapshotId::new(base),
            current: SnapshotId::new(current),
        },
        Command::Duplicates { target, .. } => Request::DetectDuplicates {
            snapshot_id: resolve(engine, &target)?,
        },
        Command::Plan {
            target,
            mode,
            roots,
            min_size,
            older_than,
            paths,
            force,
        } => {
            let mode = match mode {
                PlanMode::Duplicates => CleanupMode::Duplicates,
                PlanMode::LargeOld => CleanupMode::LargeOld {
                    min_size_bytes: parse_size(&min_size)?,
                    older_than_days: older_than,
                },
                PlanMode::LogsTemp => CleanupMode::LogsTemp,
                PlanMode::Explicit => {
                    if paths.is_empty() {
                        bail!("Explicit mode needs at least one --path");
                    }
                    CleanupMode::Explicit { paths }
                }
            };
            Request::PlanCleanup {
                snapshot_id: resolve(engine, &target)?,
                mode,
                roots,
                force_high_risk: force,
            }
        }
        Command::Execute {
            action,
            yes,
            no_quarantine,
        } => Request::ExecuteCleanup {
            action_id: ActionId::new(action),
            confirm: yes,
            quarantine_mode: !no_quarantine,
        },
        Command::Undo { action } => Request::UndoCleanup {
            action_id: ActionId::new(action),
        },
        Command::Action { action } => Request::GetAction {
            action_id: ActionId::new(action),
        },
        Command::Actions => Request::ListActions,
        Command::Purge => Request::PurgeExpired { now: None },
    };
    Ok(request)
}

/// The requested snapshot, or the newest finalized one.
fn resolve(engine: &Engine, target: &Target) -> Result<SnapshotId> {
    match target.snapshot {
        Some(id) => Ok(SnapshotId::new(id)),
        None => engine
            .latest_snapshot(None)?
            .map(|snapshot| snapshot.id)
            .ok_or_else(|| eyre!("No finalized snapshot yet; run `tidyvault scan` first")),
    }
}

/// Print scan progress to stderr until the scanner goes away.
fn report_progress(engine: &Engine) {
    let mut progress = engine.subscribe();
    std::thread::spawn(move || loop {
        match progress.blocking_recv() {
            Ok(update) => eprintln!(
                " {} files, {} ({:.0} files/s)",
                update.files_scanned,
                format_size(update.bytes_scanned),
                update.files_per_second()
            ),
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    });
}

// ==================== Text output ====================

fn render(response: &Response, clusters_shown: usize) {
    match response {
        Response::Scanned {
            snapshot,
            files_scanned,
            bytes_scanned,
            skipped_directories,
            cancelled,
        } => {
            header(&format!("Snapshot {}", snapshot.id));
            for root in &snapshot.roots {
                println!(" {}", root.display());
            }
            println!(" {} files, {}", files_scanned, format_size(*bytes_scanned));
            if *cancelled {
                println!(" Scan cancelled; snapshot is not finalized");
            }
            if !skipped_directories.is_empty() {
                println!();
                println!(" {} directories skipped:", skipped_directories.len());
                for dir in skipped_directories {
                    println!("   {} ({:?})", dir.path.display(), dir.reason);
                }
            }
        }
        Response::Snapshot { snapshot } => match snapshot {
            Some(snapshot) => print_snapshots(std::slice::from_ref(snapshot)),
            None => println!(" No such snapshot."),
        },
        Response::Snapshots { snapshots } => print_snapshots(snapshots),
        Response::Files { files } => {
            header("Largest Files");
            for file in files {
                println!(" {:>10}  {}", format_size(file.size_bytes), file.path.display());
            }
        }
        Response::Folders { folders } => {
            header("Folders");
            for folder in folders {
                println!(
                    " {:>10} {:>8} files  {}",
                    format_size(folder.bytes),
                    folder.file_count,
                    folder.path.display()
                );
            }
        }
        Response::Extensions { extensions } => {
            header("Extensions");
            for ext in extensions {
                println!(
                    " {:<12} {:>8} files {:>10}",
                    ext.extension.as_deref().unwrap_or("(none)"),
                    ext.file_count,
                    format_size(ext.total_bytes)
                );
            }
        }
        Response::Categories { categories } => {
            header("Categories");
            let max = categories.iter().map(|c| c.total_bytes).max().unwrap_or(0).max(1);
            for category in categories {
                println!(
                    " {:<10} {:>10} {:>8} files  {}",
                    category.category.to_string(),
                    format_size(category.total_bytes),
                    category.file_count,
                    make_bar(category.total_bytes as f64 / max as f64, 20)
                );
            }
        }
        Response::Pareto { points } => {
            header("Size Concentration");
            for point in points {
                println!(
                    " {:>5.1}% of files hold {:>5.1}% of bytes",
                    point.files_pct, point.bytes_pct
                );
            }
        }
        Response::Histogram { buckets } => {
            header("Size Distribution");
            let max = buckets.iter().map(|b| b.file_count).max().unwrap_or(0).max(1);
            for bucket in buckets {
                let range = match bucket.upper_bytes {
                    Some(upper) => format!("< {}", format_size(upper)),
                    None => format!(">= {}", format_size(bucket.lower_bytes)),
                };
                println!(
                    " {:<12} {:>8} files  {}",
                    range,
                    bucket.file_count,
                    make_bar(bucket.file_count as f64 / max as f64, 30)
                );
            }
        }
        Response::Growth { delta } => {
            header("Growth");
            println!(" Added:   {} files, {}", delta.added_files, format_size(delta.added_bytes));
            println!(
                " Removed: {} files, {}",
                delta.removed_files,
                format_size(delta.removed_bytes)
            );
            println!(" Changed: {} files, {:+} bytes", delta.changed_files, delta.changed_bytes);
            println!(" Net:     {:+} bytes", delta.net_bytes);
        }
        Response::Duplicates { report } => {
            header("Duplicate File Report");
            if !report.has_duplicates() {
                println!(" No duplicate files found.");
                return;
            }
            println!(
                " Found {} duplicate clusters ({} files)",
                report.clusters.len(),
                report.duplicate_files()
            );
            println!(" Total wasted space: {}", format_size(report.total_waste_bytes));
            if report.dropped_files > 0 {
                println!(" {} files changed or vanished since the scan", report.dropped_files);
            }
            println!();

            for (i, cluster) in report.clusters.iter().take(clusters_shown).enumerate() {
                println!(
                    " Cluster {} ({} files, {} each, {} wasted)",
                    i + 1,
                    cluster.member_count(),
                    format_size(cluster.size_bytes),
                    format_size(cluster.waste_bytes)
                );
                for member in &cluster.members {
                    let marker = if member.path == cluster.representative_path { "*" } else { " " };
                    println!("  {} {}", marker, member.path.display());
                }
                println!();
            }
        }
        Response::Action { action } => print_action(action),
        Response::Actions { actions } => {
            header("Cleanup Actions");
            for action in actions {
                println!(
                    " #{:<5} {:<9} {:<10} snapshot {:<5} {} files, {}",
                    action.action_id,
                    action.state.to_string(),
                    action.mode.name(),
                    action.snapshot_id,
                    action.accepted.len(),
                    format_size(action.accepted_bytes())
                );
            }
        }
        Response::Executed { report } => {
            header("Cleanup Executed");
            println!(
                " {} files removed, {} freed",
                report.deleted_count,
                format_size(report.freed_bytes)
            );
            for failed in &report.failed_paths {
                println!("   failed: {} ({})", failed.path.display(), failed.message);
            }
        }
        Response::Undone { report } => {
            header("Cleanup Undone");
            println!(" {} restored, {} failed", report.restored, report.failed);
            for result in &report.results {
                if let RestoreOutcome::Failed { message } = &result.outcome {
                    println!("   failed: {} ({})", result.original_path.display(), message);
                }
            }
        }
        Response::Purged { report } => {
            header("Quarantine Purge");
            println!(
                " {} actions expired, {} files ({}) deleted",
                report.expired_actions.len(),
                report.purged_files,
                format_size(report.purged_bytes)
            );
            for failed in &report.failed_paths {
                println!("   failed: {} ({})", failed.path.display(), failed.message);
            }
        }
    }
}

fn print_snapshots(snapshots: &[Snapshot]) {
    header("Snapshots");
    for snapshot in snapshots {
        let roots: Vec<String> = snapshot.roots.iter().map(|r| r.display().to_string()).collect();
        println!(
            " #{:<5} {}  {:>8} files {:>10}  {}{}",
            snapshot.id,
            snapshot.created_at.format("%Y-%m-%d %H:%M"),
            snapshot.file_count,
            format_size(snapshot.total_bytes),
            roots.join(", "),
            if snapshot.complete { "" } else { "  (incomplete)" }
        );
    }
}

fn print_action(action: &CleanupAction) {
    header(&format!("Action {} ({}, {})", action.action_id, action.mode.name(), action.state));
    println!(
        " {} accepted ({}), {} rejected, {} high risk skipped",
        action.accepted.len(),
        format_size(action.accepted_bytes()),
        action.rejected.len(),
        action.skipped_high_risk.len()
    );
    if !action.accepted.is_empty() {
        println!();
        for target in &action.accepted {
            println!(
                "   {:>10} {:<6} {}",
                format_size(target.size_bytes),
                target.risk.to_string(),
                target.path.display()
            );
        }
    }
    if !action.rejected.is_empty() {
        println!();
        println!(" Rejected:");
        for rejected in &action.rejected {
            println!("   {} ({})", rejected.path.display(), rejected.reason);
        }
    }
    if !action.skipped_high_risk.is_empty() {
        println!();
        println!(" High risk (use --force to include):");
        for skipped in &action.skipped_high_risk {
            println!("   {}", skipped.path.display());
        }
    }
}

fn header(title: &str) {
    println!();
    println!("{}", "─".repeat(70));
    println!(" {title}");
    println!("{}", "─".repeat(70));
    println!();
}

/// Create a simple ASCII bar.
fn make_bar(ratio: f64, width: usize) -> String {
    let filled = (ratio * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Parse a size string (e.g., "1KB", "10MB", "1GB").
fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim().to_uppercase();
    let digits = s.trim_end_matches(|c: char| !c.is_ascii_digit() && c != '.');
    let unit = &s[digits.len()..];

    let multiplier: u64 = match unit {
        "" | "B" => 1,
        "K" | "KB" => 1024,
        "M" | "MB" => 1024 * 1024,
        "G" | "GB" => 1024 * 1024 * 1024,
        "T" | "TB" => 1024 * 1024 * 1024 * 1024,
        _ => bail!("Unknown size unit '{unit}'"),
    };
    let num: f64 = digits.parse().with_context(|| format!("Invalid size '{s}'"))?;
    Ok((num * multiplier as f64) as u64)
}
