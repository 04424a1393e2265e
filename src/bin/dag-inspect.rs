//! # DAG Inspector
//!
//! Command-line tool for checking serialized DAG payloads: schema validation, structural
//! comparison of two serializations, and a readable dump of a DAG's tasks.

use clap::{Parser, Subcommand};
use dagflow_core::config::ConfigManager;
use dagflow_core::serialization::{first_difference, normalize_for_comparison, DagSerializer};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "dag-inspect")]
#[command(about = "Inspect serialized DAG payloads")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file (default: DAGFLOW_CONFIG_PATH or config/dagflow.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a serialized DAG against the schema and rebuild it
    Validate {
        /// Path to the serialized DAG (JSON)
        file: PathBuf,
    },

    /// Compare two serialized DAGs, ignoring load-time fields
    Compare { left: PathBuf, right: PathBuf },

    /// Print the tasks of a serialized DAG in dependency order
    Show { file: PathBuf },

    /// Print the effective configuration
    Config,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Commands::Validate { file } => validate(&cli, file),
        Commands::Compare { left, right } => compare(&cli, left, right),
        Commands::Show { file } => show(&cli, file),
        Commands::Config => show_config(&cli),
    };

    match result {
        Ok(()) => {
            info!("Inspection completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Inspection failed: {}", e);
            eprintln!("❌ {e}");
            process::exit(1);
        }
    }
}

fn serializer(cli: &Cli) -> Result<DagSerializer, Box<dyn std::error::Error>> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::load_from_file(path)?,
        None => ConfigManager::load()?,
    };
    Ok(DagSerializer::new(&manager.config().serialization))
}

fn read_payload(path: &Path) -> Result<Value, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    Ok(serde_json::from_str(&text)?)
}

fn validate(cli: &Cli, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating {}", file.display());
    let payload = read_payload(file)?;
    let dag = serializer(cli)?.deserialize(&payload)?;
    println!("✅ Schema valid");
    println!("✅ DAG '{}' rebuilt with {} tasks", dag.dag_id, dag.task_count());
    Ok(())
}

fn compare(_cli: &Cli, left: &Path, right: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Comparing {} vs {}", left.display(), right.display());
    let left = normalize_for_comparison(&read_payload(left)?);
    let right = normalize_for_comparison(&read_payload(right)?);

    match first_difference(&left, &right) {
        None => {
            println!("✅ Serialized DAGs are equivalent");
            Ok(())
        }
        Some(path) => Err(format!("Serialized DAGs differ at {path}").into()),
    }
}

fn show(cli: &Cli, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let dag = serializer(cli)?.deserialize(&read_payload(file)?)?;
    println!("📋 DAG '{}'", dag.dag_id);
    println!("   schedule: {}", dag.schedule_interval);
    if let Some(start_date) = dag.start_date {
        println!("   start_date: {}", start_date.to_rfc3339());
    }
    println!("   tasks: {}", dag.task_count());
    let ids = |tasks: Vec<&dagflow_core::models::Task>| {
        tasks
            .iter()
            .map(|task| task.task_id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    println!("   roots: [{}]", ids(dag.roots()));
    println!("   leaves: [{}]", ids(dag.leaves()));

    let order = dag
        .topological_order()
        .ok_or_else(|| format!("DAG '{}' contains a cycle", dag.dag_id))?;
    for task_id in order {
        let Some(task) = dag.task(&task_id) else {
            continue;
        };
        let upstream: Vec<&str> = task.upstream_task_ids.iter().map(String::as_str).collect();
        println!(
            "  • {} [{}] trigger_rule={} upstream=[{}]",
            task.task_id,
            task.task_type,
            task.trigger_rule.as_str(),
            upstream.join(", ")
        );
    }
    Ok(())
}

fn show_config(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::load_from_file(path)?,
        None => ConfigManager::load()?,
    };
    println!("🔧 Environment: {}", manager.environment());
    match manager.source() {
        Some(path) => println!("   source: {}", path.display()),
        None => println!("   source: defaults and environment"),
    }
    println!("{}", serde_json::to_string_pretty(manager.config())?);
    Ok(())
}
