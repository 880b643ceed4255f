//! Artifact ledger CLI
//!
//! Read-mostly inspection of a ledger directory. Results are printed to
//! stdout as JSON; logs go to stderr and honour `RUST_LOG`.

use artifact_ledger::{
    ArtifactFilter, ArtifactManager, ArtifactStatus, ArtifactType, AuditQuery, ExportFormat,
    LedgerConfig, TimeRange,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "artifact-ledger")]
#[command(about = "Inspect artifacts, lineage and the audit trail", version)]
struct Cli {
    /// Path to ledger config file (TOML)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Ledger root; overrides `base_path` from the config file
    #[arg(long, short = 'b', global = true)]
    base_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Storage, artifact and audit statistics
    Stats,

    /// List artifacts
    List {
        /// Filter by artifact type (e.g. video_raw)
        #[arg(long = "type", short = 't')]
        artifact_type: Option<ArtifactType>,

        /// Filter by status (e.g. completed)
        #[arg(long, short = 's')]
        status: Option<ArtifactStatus>,

        /// Filter by metadata run_id
        #[arg(long, short = 'r')]
        run: Option<String>,
    },

    /// Show one artifact's metadata
    Show {
        /// Artifact ID
        id: String,
    },

    /// Show an artifact's provenance tree
    Lineage {
        /// Artifact ID
        id: String,
    },

    /// Audit entries recorded against an artifact
    History {
        /// Artifact ID
        id: String,

        /// Maximum number of entries
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },

    /// Summary of failed operations
    Errors,

    /// Export the audit trail
    Export {
        /// Destination file
        path: PathBuf,

        /// Output format (json or csv)
        #[arg(long, short = 'f', default_value = "json")]
        format: String,
    },

    /// Delete stored files of old artifacts (metadata is kept)
    Cleanup {
        /// Age threshold in days
        #[arg(long, short = 'd', default_value_t = 30)]
        days: u32,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let manager = match open_manager(cli.config, cli.base_path) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error opening ledger: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Stats => manager
            .get_statistics()
            .map_err(|e| e.to_string())
            .and_then(|stats| print_json(&stats)),
        Commands::List {
            artifact_type,
            status,
            run,
        } => run_list(&manager, artifact_type, status, run),
        Commands::Show { id } => run_show(&manager, &id),
        Commands::Lineage { id } => manager
            .get_artifact_lineage(&id)
            .map_err(|e| e.to_string())
            .and_then(|tree| print_json(&tree)),
        Commands::History { id, limit } => run_history(&manager, &id, limit),
        Commands::Errors => run_errors(&manager),
        Commands::Export { path, format } => run_export(&manager, path, &format),
        Commands::Cleanup { days } => manager
            .cleanup_old_artifacts(days)
            .map_err(|e| e.to_string())
            .and_then(|removed| print_json(&serde_json::json!({ "removed": removed }))),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    // Only fails if a subscriber is already installed
    let _ = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init();
}

fn open_manager(
    config_path: Option<PathBuf>,
    base_path: Option<PathBuf>,
) -> Result<ArtifactManager, String> {
    let mut config = match config_path {
        Some(path) => LedgerConfig::from_file(&path).map_err(|e| e.to_string())?,
        None => LedgerConfig::default(),
    };
    if let Some(base_path) = base_path {
        config.base_path = base_path;
    }
    ArtifactManager::from_config(&config).map_err(|e| e.to_string())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

fn run_list(
    manager: &ArtifactManager,
    artifact_type: Option<ArtifactType>,
    status: Option<ArtifactStatus>,
    run: Option<String>,
) -> Result<(), String> {
    let filter = ArtifactFilter {
        artifact_type,
        status,
        run_id: run,
    };
    let artifacts = manager.list_artifacts(&filter).map_err(|e| e.to_string())?;

    let rows: Vec<serde_json::Value> = artifacts
        .iter()
        .map(|a| {
            serde_json::json!({
                "artifact_id": a.artifact_id,
                "artifact_type": a.artifact_type.as_str(),
                "status": a.status.as_str(),
                "created_at": a.created_at,
                "processing_module": a.processing_module,
                "file_size": a.file_size,
            })
        })
        .collect();
    print_json(&rows)
}

fn run_show(manager: &ArtifactManager, id: &str) -> Result<(), String> {
    match manager.get_artifact(id).map_err(|e| e.to_string())? {
        Some(artifact) => print_json(&artifact_ledger::store::ArtifactRecord::from(&artifact)),
        None => Err(format!("artifact not found: {}", id)),
    }
}

fn run_history(manager: &ArtifactManager, id: &str, limit: Option<usize>) -> Result<(), String> {
    let audit = manager.audit().ok_or("auditing is disabled")?;
    let mut query = AuditQuery::new().artifact_id(id);
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    let entries = audit.query(&query).map_err(|e| e.to_string())?;
    print_json(&entries)
}

fn run_errors(manager: &ArtifactManager) -> Result<(), String> {
    let audit = manager.audit().ok_or("auditing is disabled")?;
    let summary = audit
        .error_summary(TimeRange::default())
        .map_err(|e| e.to_string())?;
    print_json(&summary)
}

fn run_export(manager: &ArtifactManager, path: PathBuf, format: &str) -> Result<(), String> {
    let audit = manager.audit().ok_or("auditing is disabled")?;
    let format = format
        .parse::<ExportFormat>()
        .map_err(|e| e.to_string())?;
    let written = audit
        .export(&path, TimeRange::default(), format)
        .map_err(|e| e.to_string())?;
    eprintln!("Exported audit trail to {}", written.display());
    Ok(())
}
