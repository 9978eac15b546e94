// arborsync CLI - reconcile municipal tree CSV exports against the local
// store and the remote inventory service.

mod exit_codes;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use arborsync_config::{ConfigError, SyncConfig};
use arborsync_core::{validate_records, CancelToken, InventoryService, TreeImport};
use arborsync_geo::{GeoPoint, GeoTransformer};
use arborsync_import::{csv, ImportService};
use arborsync_recon::{diff, MatchOptions};
use arborsync_remote::InventoryClient;
use arborsync_store::TreeStore;

use exit_codes::{run_exit_code, EXIT_CONFIG, EXIT_INPUT, EXIT_LOCAL, EXIT_REMOTE, EXIT_SUCCESS, EXIT_TRANSFORM, EXIT_VALIDATION};

#[derive(Parser)]
#[command(name = "arborsync")]
#[command(about = "Reconcile a municipal tree CSV export against the inventory")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, env = "ARBORSYNC_CONFIG", default_value = "arborsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full reconciliation: local transaction, then remote mirror
    #[command(after_help = "\
Examples:
  arborsync import trees.csv
  arborsync import trees.csv --json
  ARBORSYNC_API_TOKEN=... arborsync import trees.csv")]
    Import {
        /// CSV export to reconcile
        file: PathBuf,

        /// Print the run report as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Parse, reproject, and validate a file without touching any store
    Validate {
        /// CSV export to check
        file: PathBuf,
    },

    /// Show what a reconciliation would change, without writing anything
    Diff {
        /// CSV export to compare against the local store
        file: PathBuf,

        /// Print the diff summary as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Check connectivity and credentials against the remote service
    Ping,
}

struct CliError {
    code: u8,
    message: String,
}

fn cli_err(code: u8, message: impl Into<String>) -> CliError {
    CliError { code, message: message.into() }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Import { file, json } => cmd_import(&cli.config, &file, json),
        Commands::Validate { file } => cmd_validate(&cli.config, &file),
        Commands::Diff { file, json } => cmd_diff(&cli.config, &file, json),
        Commands::Ping => cmd_ping(&cli.config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("error: {}", e.message);
            ExitCode::from(e.code)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("arborsync=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: &Path) -> Result<SyncConfig, CliError> {
    SyncConfig::load(path).map_err(|e: ConfigError| cli_err(EXIT_CONFIG, e.to_string()))
}

fn open_remote(config: &SyncConfig) -> Result<InventoryClient, CliError> {
    InventoryClient::new(
        config.remote.api_base.clone(),
        config.remote.token.clone(),
        Duration::from_secs(config.remote.timeout_secs),
    )
    .map_err(|e| cli_err(EXIT_REMOTE, e.to_string()))
}

fn cmd_import(config_path: &Path, file: &Path, json: bool) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let store = TreeStore::open(&config.store.path)
        .map_err(|e| cli_err(EXIT_LOCAL, e.to_string()))?;
    let remote = open_remote(&config)?;

    let mut service = ImportService::new(config, store, remote)
        .map_err(|e| cli_err(run_exit_code(&e), format!("[{}] {e}", e.stage())))?;

    let report = service
        .run_file(file, &CancelToken::new())
        .map_err(|e| cli_err(run_exit_code(&e), format!("[{}] {e}", e.stage())))?;

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(s) => println!("{s}"),
            Err(e) => return Err(cli_err(exit_codes::EXIT_ERROR, e.to_string())),
        }
    }

    eprintln!(
        "batch {}: {} created, {} updated, {} deleted, {} unchanged",
        report.batch_id, report.created, report.updated, report.deleted, report.unchanged
    );
    Ok(())
}

fn cmd_validate(config_path: &Path, file: &Path) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let records = parse_and_project(&config, file)?;
    eprintln!("{} records parsed, reprojected, and validated", records.len());
    Ok(())
}

fn cmd_diff(config_path: &Path, file: &Path, json: bool) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let records = parse_and_project(&config, file)?;

    let store = TreeStore::open(&config.store.path)
        .map_err(|e| cli_err(EXIT_LOCAL, e.to_string()))?;
    let current = store.list_all().map_err(|e| cli_err(EXIT_LOCAL, e.to_string()))?;

    let opts = MatchOptions { coordinate_precision: config.recon.match_precision };
    let outcome = diff(&current, records, &opts);

    if json {
        match serde_json::to_string_pretty(&outcome.summary) {
            Ok(s) => println!("{s}"),
            Err(e) => return Err(cli_err(exit_codes::EXIT_ERROR, e.to_string())),
        }
    }

    let s = outcome.summary;
    eprintln!(
        "{} incoming against {} current: {} to create, {} to update, {} to delete, {} unchanged",
        s.incoming,
        current.len(),
        s.create,
        s.update,
        s.delete,
        s.unchanged
    );
    Ok(())
}

fn cmd_ping(config_path: &Path) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let remote = open_remote(&config)?;
    let info = remote
        .server_info()
        .map_err(|e| cli_err(EXIT_REMOTE, e.to_string()))?;
    eprintln!("{} {}", info.name, info.version);
    Ok(())
}

/// The read-only front half of the pipeline, shared by `validate` and
/// `diff`.
fn parse_and_project(config: &SyncConfig, file: &Path) -> Result<Vec<TreeImport>, CliError> {
    let raw = csv::read_file(file).map_err(|e| cli_err(EXIT_INPUT, e.to_string()))?;
    let records =
        csv::parse(&raw, &config.columns).map_err(|e| cli_err(EXIT_INPUT, e.to_string()))?;

    let transformer = GeoTransformer::new(config.geo.source_epsg, config.geo.target_epsg)
        .map_err(|e| cli_err(EXIT_TRANSFORM, e.to_string()))?;
    let points: Vec<GeoPoint> =
        records.iter().map(|rec| GeoPoint::new(rec.longitude, rec.latitude)).collect();
    let transformed = transformer
        .transform_batch(&points)
        .map_err(|e| cli_err(EXIT_TRANSFORM, e.to_string()))?;

    let mut records = records;
    for (rec, point) in records.iter_mut().zip(&transformed) {
        rec.longitude = point.x;
        rec.latitude = point.y;
    }

    validate_records(&records).map_err(|e| cli_err(EXIT_VALIDATION, e.to_string()))?;
    Ok(records)
}
