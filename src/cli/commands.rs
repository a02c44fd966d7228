//! CLI command definitions for automl-bench.
//!
//! This module provides the command-line interface for running AutoML
//! engines against datasets and querying the stored results.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::info;

use crate::compare::{ComparisonService, ComparisonView};
use crate::dataset::CsvDatasetLoader;
use crate::engine::EngineKind;
use crate::metrics::export_metrics;
use crate::monitor::{SystemInfo, SystemStats};
use crate::pipeline::{PipelineConfig, RunEvent, RunPipeline, RunStream};
use crate::registry::{ResultsRegistry, RunRecord};

/// AutoML benchmark runner.
#[derive(Parser)]
#[command(name = "automl-bench")]
#[command(about = "Run AutoML engines on tabular datasets and compare the results")]
#[command(version)]
#[command(
    long_about = "automl-bench trains AutoML engines on CSV datasets, tracks CPU and memory\nwhile they train, and keeps one result per (dataset, engine) for comparison.\n\nExample usage:\n  automl-bench run --dataset iris.csv --engine flaml\n  automl-bench compare --dataset iris.csv --tool flaml"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Directory holding the CSV datasets.
    #[arg(long, env = "AUTOML_DATASETS_DIR", global = true)]
    pub datasets_dir: Option<PathBuf>,

    /// Path of the results registry file.
    #[arg(long, env = "AUTOML_RESULTS_PATH", global = true)]
    pub results_path: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Train one engine on a dataset and store the result.
    Run(RunArgs),

    /// Train every engine on a dataset concurrently.
    #[command(alias = "bench")]
    Benchmark(BenchmarkArgs),

    /// Compare one engine's stored result against the other engines.
    Compare(CompareArgs),

    /// List stored results.
    Results(ResultsArgs),

    /// Manage datasets.
    Datasets(DatasetsArgs),

    /// Show host information and current usage.
    System,

    /// Print Prometheus metrics in text exposition format.
    Metrics,
}

/// Arguments for `automl-bench run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Dataset identifier (file name under the datasets directory).
    #[arg(short, long)]
    pub dataset: String,

    /// Engine to run (flaml, tpot, h2o, autogluon, pycaret).
    #[arg(short, long)]
    pub engine: String,

    /// Output events as JSON lines.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `automl-bench benchmark`.
#[derive(Parser, Debug)]
pub struct BenchmarkArgs {
    /// Dataset identifier.
    #[arg(short, long)]
    pub dataset: String,

    /// Output events as JSON lines.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `automl-bench compare`.
#[derive(Parser, Debug)]
pub struct CompareArgs {
    /// Dataset identifier.
    #[arg(short, long)]
    pub dataset: String,

    /// Tool whose result is compared against the others.
    #[arg(short, long)]
    pub tool: String,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `automl-bench results`.
#[derive(Parser, Debug)]
pub struct ResultsArgs {
    /// Only show results for this dataset.
    #[arg(short, long)]
    pub dataset: Option<String>,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Dataset management entrypoint arguments.
#[derive(Parser, Debug)]
pub struct DatasetsArgs {
    #[command(subcommand)]
    pub command: DatasetsSubcommand,
}

/// Dataset subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum DatasetsSubcommand {
    /// List CSV datasets.
    List,

    /// Copy a CSV file into the datasets directory.
    Import {
        /// Path of the CSV file to import.
        path: PathBuf,
    },
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For more control over logging initialization, use `parse_cli()` and `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = build_config(&cli)?;
    match cli.command {
        Commands::Run(args) => run_engine_command(config, args).await,
        Commands::Benchmark(args) => run_benchmark_command(config, args).await,
        Commands::Compare(args) => run_compare_command(config, args).await,
        Commands::Results(args) => run_results_command(config, args).await,
        Commands::Datasets(args) => run_datasets_command(config, args).await,
        Commands::System => run_system_command().await,
        Commands::Metrics => {
            print!("{}", export_metrics());
            Ok(())
        }
    }
}

/// Environment configuration with the path flags applied on top.
fn build_config(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    let mut config = PipelineConfig::from_env().context("Invalid AUTOML_* configuration")?;
    if let Some(dir) = &cli.datasets_dir {
        config = config.with_datasets_dir(dir.clone());
    }
    if let Some(path) = &cli.results_path {
        config = config.with_results_path(path.clone());
    }
    config.validate()?;
    Ok(config)
}

fn open_registry(config: &PipelineConfig) -> Arc<ResultsRegistry> {
    Arc::new(ResultsRegistry::new(config.results_path.clone()))
}

// ============================================================================
// Run Commands
// ============================================================================

async fn run_engine_command(config: PipelineConfig, args: RunArgs) -> anyhow::Result<()> {
    let registry = open_registry(&config);
    let pipeline = RunPipeline::new(config, registry)?;

    if !args.json {
        println!("\n🚀 AutoML Run");
        println!("=============");
        println!("Dataset: {}", args.dataset);
        println!("Engine: {}", args.engine);
        println!();
    }

    let stream = pipeline.run(&args.dataset, &args.engine);
    let terminal = drain(stream, None, args.json).await?;
    finish(terminal)
}

async fn run_benchmark_command(config: PipelineConfig, args: BenchmarkArgs) -> anyhow::Result<()> {
    let registry = open_registry(&config);
    let pipeline = RunPipeline::new(config, registry)?;
    info!(dataset = %args.dataset, engines = EngineKind::ALL.len(), "Starting benchmark");

    let json = args.json;
    let runs = pipeline.run_all(&args.dataset).into_iter().map(|(kind, stream)| async move {
        let terminal = drain(stream, Some(kind), json).await;
        (kind, terminal)
    });
    let outcomes = futures::future::join_all(runs).await;

    if json {
        return Ok(());
    }

    println!("\n{}", "=".repeat(50));
    println!("📊 Benchmark Summary: {}", args.dataset);
    println!("{}", "=".repeat(50));
    for (kind, terminal) in outcomes {
        let line = match terminal {
            Ok(Some(RunEvent::Result(done))) => {
                let primary = crate::engine::scoring::primary_metric(done.record.task);
                let value = done
                    .record
                    .metric(primary)
                    .map(|v| format!("{primary}={v:.4}"))
                    .unwrap_or_default();
                format!("✓ {} {}", done.record.best_model, value)
            }
            Ok(Some(RunEvent::Skipped(skip))) => format!("- skipped: {}", skip.reason),
            Ok(Some(RunEvent::Error(failure))) => {
                format!("✗ {} error: {}", failure.kind, failure.message)
            }
            Ok(_) => "✗ ended without a result".to_string(),
            Err(e) => format!("✗ {e}"),
        };
        println!("  {:<10} {}", kind.display_name(), line);
    }
    Ok(())
}

/// Prints every event of `stream` and returns its terminal event.
async fn drain(
    mut stream: RunStream,
    engine: Option<EngineKind>,
    json: bool,
) -> anyhow::Result<Option<RunEvent>> {
    let mut terminal = None;
    while let Some(event) = stream.next_event().await {
        if json {
            let line = match engine {
                Some(kind) => serde_json::to_string(&serde_json::json!({
                    "engine": kind.as_str(),
                    "event": &event,
                })),
                None => serde_json::to_string(&event),
            }
            .context("Failed to serialize event")?;
            println!("{line}");
        } else {
            print_event(&event, engine);
        }
        if event.is_terminal() {
            terminal = Some(event);
        }
    }
    Ok(terminal)
}

fn print_event(event: &RunEvent, engine: Option<EngineKind>) {
    let prefix = engine
        .map(|kind| format!("[{}] ", kind.as_str()))
        .unwrap_or_default();
    match event {
        RunEvent::Log(line) => println!("{prefix}📝 {line}"),
        RunEvent::Stats(snapshot) => println!(
            "{prefix}   ⏱ {:.1}s cpu {:.1}% ram {:.2} GB (peak {:.1}% / {:.2} GB)",
            snapshot.elapsed_secs,
            snapshot.cpu_percent,
            snapshot.ram_used_gb,
            snapshot.cpu_peak_percent,
            snapshot.ram_peak_gb
        ),
        RunEvent::Result(done) => {
            println!("{prefix}✓ Best model: {}", done.record.best_model);
            for (name, value) in &done.record.metrics {
                println!("{prefix}   {name}: {value}");
            }
            println!(
                "{prefix}   train time {:.2}s, cpu peak {:.1}%, ram peak {:.2} GB",
                done.record.system.train_time_secs,
                done.record.system.cpu_peak_percent,
                done.record.system.ram_peak_gb
            );
            if !done.persisted {
                println!("{prefix}⚠ Result was not saved to the registry");
            }
        }
        RunEvent::Skipped(skip) => println!("{prefix}⚠ Skipped: {}", skip.reason),
        RunEvent::Error(failure) => {
            println!("{prefix}✗ {} error: {}", failure.kind, failure.message)
        }
    }
}

fn finish(terminal: Option<RunEvent>) -> anyhow::Result<()> {
    match terminal {
        Some(RunEvent::Result(_)) | Some(RunEvent::Skipped(_)) => Ok(()),
        Some(RunEvent::Error(failure)) => {
            anyhow::bail!("Run failed ({}): {}", failure.kind, failure.message)
        }
        _ => anyhow::bail!("Run ended without a terminal event"),
    }
}

// ============================================================================
// Query Commands
// ============================================================================

async fn run_compare_command(config: PipelineConfig, args: CompareArgs) -> anyhow::Result<()> {
    let service = ComparisonService::new(open_registry(&config));
    let view = service.compare(&args.dataset, &args.tool).await?;

    if args.json {
        print_json(&view)?;
    } else {
        print_comparison(&view, &args.tool);
    }
    Ok(())
}

fn print_comparison(view: &ComparisonView, tool: &str) {
    println!("\n📊 Comparison on {}", view.dataset);
    println!("{}", "=".repeat(50));
    match &view.selected {
        Some(record) => print_record(record),
        None => println!("No result for '{tool}' on this dataset"),
    }
    if !view.others.is_empty() {
        println!("\nOther tools:");
        for record in &view.others {
            print_record(record);
        }
    }
    if !view.best_per_metric.is_empty() {
        println!("\n🏆 Best per metric:");
        for (metric, leader) in &view.best_per_metric {
            println!(
                "  {:<20} {:<10} {:.4} ({})",
                metric, leader.tool, leader.value, leader.model
            );
        }
    }
}

fn print_record(record: &RunRecord) {
    let metrics = record
        .metrics
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(" ");
    println!(
        "  {:<10} {:<28} {} ({:.2}s)",
        record.tool, record.best_model, metrics, record.system.train_time_secs
    );
}

async fn run_results_command(config: PipelineConfig, args: ResultsArgs) -> anyhow::Result<()> {
    let registry = open_registry(&config);
    let records = match &args.dataset {
        Some(dataset) => registry.records_for_dataset(dataset).await?,
        None => registry.load().await?,
    };

    if args.json {
        return print_json(&records);
    }

    if records.is_empty() {
        println!("No results stored in {}", registry.path().display());
        return Ok(());
    }
    let mut current: Option<&str> = None;
    for record in &records {
        if current != Some(record.dataset.as_str()) {
            println!("\n📁 {} ({})", record.dataset, record.task);
            current = Some(record.dataset.as_str());
        }
        print_record(record);
    }
    Ok(())
}

async fn run_datasets_command(config: PipelineConfig, args: DatasetsArgs) -> anyhow::Result<()> {
    let loader = CsvDatasetLoader::new(config.datasets_dir.clone());
    match args.command {
        DatasetsSubcommand::List => {
            let datasets = loader.list().await?;
            if datasets.is_empty() {
                println!("No datasets in {}", loader.root().display());
            }
            for info in datasets {
                let modified = info
                    .modified
                    .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("  {:<32} {:>10} bytes  {}", info.name, info.size_bytes, modified);
            }
        }
        DatasetsSubcommand::Import { path } => {
            let name = loader
                .import(&path)
                .await
                .with_context(|| format!("Failed to import {}", path.display()))?;
            println!("✓ Imported '{}' into {}", name, loader.root().display());
        }
    }
    Ok(())
}

async fn run_system_command() -> anyhow::Result<()> {
    let info = SystemInfo::collect();
    let stats = SystemStats::collect().await;

    println!("\n🖥  System");
    println!("=========");
    println!("OS: {}", info.os);
    println!("CPU: {} cores / {} threads", info.cpu_cores, info.cpu_threads);
    println!("RAM total: {:.2} GB", info.ram_total_gb);
    println!("CPU usage: {:.1}%", stats.cpu_percent);
    println!(
        "RAM used: {:.2} GB ({:.1}%)",
        stats.ram_used_gb, stats.ram_percent
    );
    println!("Uptime: {}s", stats.uptime_secs);
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let output = serde_json::to_string_pretty(value)
        .map_err(|e| anyhow::anyhow!("Failed to serialize JSON: {}", e))?;
    println!("{}", output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ErrorKind, RunSkipped};

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "automl-bench",
            "run",
            "--dataset",
            "iris.csv",
            "--engine",
            "flaml",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.log_level, "info");
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.dataset, "iris.csv");
                assert_eq!(args.engine, "flaml");
                assert!(args.json);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_parse_datasets_import() {
        let cli = Cli::try_parse_from([
            "automl-bench",
            "--log-level",
            "debug",
            "datasets",
            "import",
            "/tmp/wine.csv",
        ])
        .unwrap();
        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::Datasets(DatasetsArgs {
                command: DatasetsSubcommand::Import { path },
            }) => assert_eq!(path, PathBuf::from("/tmp/wine.csv")),
            _ => panic!("expected datasets import"),
        }
    }

    #[test]
    fn test_compare_requires_tool() {
        assert!(Cli::try_parse_from(["automl-bench", "compare", "--dataset", "x.csv"]).is_err());
    }

    #[test]
    fn test_finish_maps_terminal_events() {
        let skipped = RunEvent::Skipped(RunSkipped {
            dataset: "tiny.csv".to_string(),
            tool: "flaml".to_string(),
            reason: "too small".to_string(),
        });
        assert!(finish(Some(skipped)).is_ok());

        let err = finish(Some(RunEvent::error(ErrorKind::Data, "Dataset 'x' not found")))
            .unwrap_err()
            .to_string();
        assert!(err.contains("data"));
        assert!(finish(None).is_err());
    }
}
