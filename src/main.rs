//! dupelink - find duplicate files and replace them with links.
//!
//! Usage:
//!   dupelink link [ROOTS]...        Detect duplicates, optionally link them
//!   dupelink import FILE --db DB    Import a {hash: path} JSON index into a store
//!   dupelink export FILE --db DB    Export a store to a {hash: path} JSON index
//!   dupelink --help                 Show help

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result};
use tracing::error;
use tracing_subscriber::EnvFilter;

use dupelink_core::{DedupConfig, FsVolumes};
use dupelink_scan::{Deduper, RunReport};
use dupelink_store::FileStore;
use dupelink_store::interchange::{read_index_map, write_index_map};

#[derive(Parser)]
#[command(
    name = "dupelink",
    version,
    about = "Find duplicate files and replace them with links",
    long_about = "dupelink fingerprints every file under the given roots and finds files \
                  with identical content.\n\n\
                  Duplicates can be replaced by hardlinks or relative symlinks to the \
                  first copy seen. A SQLite store lets later runs skip files whose size \
                  has not changed."
)]
struct Cli {
    /// TOML configuration file; command-line flags override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log every decision
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Find duplicates under each root and reconcile them
    Link {
        /// Roots to process, in order (defaults to current directory)
        #[arg(default_value = ".")]
        roots: Vec<PathBuf>,

        /// Number of hashing workers (0 = one per CPU)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Replace duplicates with hardlinks
        #[arg(short = 'H', long)]
        hardlink: bool,

        /// Only hardlink files under these prefixes (comma-separated)
        #[arg(long, value_delimiter = ',')]
        hardlink_paths: Vec<PathBuf>,

        /// Replace duplicates with relative symlinks
        #[arg(short, long)]
        symlink: bool,

        /// SQLite store remembering fingerprints across runs
        #[arg(long)]
        db: Option<PathBuf>,

        /// Seed the index from a JSON file
        #[arg(short, long)]
        load: Option<PathBuf>,

        /// Write the final index to a JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print each run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Import a {hash: path} JSON index into a store
    Import {
        /// JSON file to read
        file: PathBuf,

        /// SQLite store to import into
        #[arg(long)]
        db: PathBuf,
    },

    /// Export a store to a {hash: path} JSON index
    Export {
        /// JSON file to write
        file: PathBuf,

        /// SQLite store to export
        #[arg(long)]
        db: PathBuf,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let mut config = load_config(&cli)?;
    init_logging(&config);

    let result = match cli.command {
        Command::Link {
            roots,
            workers,
            hardlink,
            hardlink_paths,
            symlink,
            db,
            load,
            output,
            json,
        } => {
            if let Some(workers) = workers {
                config.workers = workers;
            }
            config.hardlink |= hardlink;
            config.symlink |= symlink;
            if !hardlink_paths.is_empty() {
                config.hardlink_paths = hardlink_paths;
            }
            if db.is_some() {
                config.database = db;
            }
            if load.is_some() {
                config.load_index = load;
            }
            if output.is_some() {
                config.save_index = output;
            }
            run_link(config, &roots, json)
        }
        Command::Import { file, db } => run_import(&file, &db),
        Command::Export { file, db } => run_export(&file, &db),
    };

    if let Err(ref e) = result {
        error!(error = %e, "dupelink failed");
    }
    result
}

/// Read the configuration file, if any, and apply the global flags.
fn load_config(cli: &Cli) -> Result<DedupConfig> {
    let mut config = match &cli.config {
        Some(path) => DedupConfig::from_toml_file(path)
            .wrap_err_with(|| format!("Cannot load configuration {}", path.display()))?,
        None => DedupConfig::default(),
    };
    config.quiet |= cli.quiet;
    config.verbose |= cli.verbose;
    Ok(config)
}

/// Log to stderr. `RUST_LOG` overrides the configured verbosity.
fn init_logging(config: &DedupConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Process each root in turn with one shared index.
fn run_link(config: DedupConfig, roots: &[PathBuf], json: bool) -> Result<()> {
    config.check().context("Invalid configuration")?;
    let mut deduper = Deduper::new(config).context("Cannot start deduplication")?;

    for root in roots {
        let report = deduper
            .run(root)
            .wrap_err_with(|| format!("Run failed for {}", root.display()))?;

        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }
    }

    Ok(())
}

fn print_report(report: &RunReport) {
    println!(
        "Savings of {} ({} bytes) in {}",
        format_size(report.savings_bytes),
        report.savings_bytes,
        report.root.display()
    );

    if report.has_warnings() {
        eprintln!("{} warning(s) during run", report.warnings.len());
    }
}

fn run_import(file: &Path, db: &Path) -> Result<()> {
    let map = read_index_map(file)
        .wrap_err_with(|| format!("Cannot read index {}", file.display()))?;
    let store = FileStore::open(db)
        .wrap_err_with(|| format!("Cannot open store {}", db.display()))?;

    let imported = store.import_map(&map, &FsVolumes).context("Import failed")?;
    println!("Imported {} of {} records into {}", imported, map.len(), db.display());
    Ok(())
}

fn run_export(file: &Path, db: &Path) -> Result<()> {
    let store = FileStore::open(db)
        .wrap_err_with(|| format!("Cannot open store {}", db.display()))?;
    let map = store.export_map().context("Export failed")?;

    let written = write_index_map(file, &map, true)
        .wrap_err_with(|| format!("Cannot write index {}", file.display()))?;
    println!("Exported {} of {} records to {}", written, map.len(), file.display());
    Ok(())
}

/// Format a byte count for display.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
