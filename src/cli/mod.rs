//! Command-line interface for exeda.
//!
//! Provides commands for running the analysis pipeline, checking the status
//! of a run, and inspecting the resolved configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config;
use crate::io::load_csv;
use crate::pipeline::{Orchestrator, RunOutcome, RunReport};
use crate::progress::StatusSnapshot;

/// exeda - automated explainable EDA pipeline
#[derive(Parser, Debug)]
#[command(name = "exeda")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze a CSV file end to end
    Run {
        /// Input CSV file
        file: PathBuf,

        /// Output directory (overrides config and EXEDA_OUTPUT)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Target column for model training (heuristic pick if omitted)
        #[arg(short, long)]
        target: Option<String>,
    },

    /// Show the status of the run in an output directory
    Status {
        /// Output directory to inspect
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                file,
                output,
                target,
            } => run_analysis(&file, output, target).await,
            Commands::Status { output } => show_status(output).await,
            Commands::Config => show_config(),
        }
    }
}

/// Load the CSV and run the full pipeline
async fn run_analysis(
    file: &std::path::Path,
    output: Option<PathBuf>,
    target: Option<String>,
) -> Result<()> {
    let cfg = config::config()?;
    let output_dir = output.unwrap_or_else(|| cfg.output_dir.clone());

    let dataset = load_csv(file)
        .with_context(|| format!("Failed to load dataset: {}", file.display()))?;
    eprintln!(
        "Loaded {} rows x {} columns from {}",
        dataset.row_count(),
        dataset.column_count(),
        file.display()
    );

    let orchestrator = Orchestrator::new(&output_dir)
        .with_retry_policy(cfg.retry.clone())
        .with_target(target);

    match orchestrator.run(dataset).await? {
        RunOutcome::Completed(report) => {
            print_report(&report);
            Ok(())
        }
        RunOutcome::AlreadyRunning => {
            eprintln!("Another analysis is already running in this process.");
            std::process::exit(1);
        }
    }
}

fn print_report(report: &RunReport) {
    println!("\nAnalysis complete (run {})", report.run_id);
    println!("\nGenerated files:");
    println!("{:<40} {}", "FILE", "PATH");
    println!("{}", "-".repeat(72));
    for file in &report.files {
        println!(
            "{:<40} {}",
            file.display(),
            report.output_dir.join(file).display()
        );
    }

    if report.change_log.is_empty() {
        println!("\nNo transformations were applied to the data.");
    } else {
        println!("\nApplied transformations:");
        for (i, entry) in report.change_log.iter().enumerate() {
            println!(
                "  {}. [{}] {}: {} rows filled with {}",
                i + 1,
                entry.action,
                entry.column,
                entry.affected_rows,
                entry.value_used
            );
        }
    }
}

/// Read and pretty-print status.json from an output directory
async fn show_status(output: Option<PathBuf>) -> Result<()> {
    let output_dir = match output {
        Some(dir) => dir,
        None => config::output_dir()?,
    };
    let path = output_dir.join("status.json");
    let content = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("No status found at {}", path.display()))?;
    let snapshot: StatusSnapshot =
        serde_json::from_str(&content).with_context(|| format!("Invalid {}", path.display()))?;

    println!("Status:   {:?}", snapshot.status);
    println!("Progress: {}%", snapshot.progress);
    println!("Message:  {}", snapshot.message);
    if let Some(stage) = snapshot.current_stage {
        println!("Stage:    {}", stage.display_name());
    }
    println!("\nStages:");
    for stage in &snapshot.stages {
        println!("  {:<22} {:?}", stage.name, stage.state);
    }
    if !snapshot.activity_log.is_empty() {
        println!("\nRecent activity:");
        for entry in snapshot.activity_log.iter().take(10) {
            println!(
                "  [{}] {} - {} ({})",
                entry.timestamp.format("%H:%M:%S"),
                entry.actor,
                entry.action,
                entry.status
            );
        }
    }

    Ok(())
}

/// Show the resolved configuration (for debugging)
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("exeda configuration");
    println!(
        "Config file:    {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!("Output dir:     {}", cfg.output_dir.display());
    println!("Retry attempts: {}", cfg.retry.max_attempts);
    println!("Retry backoff:  {}ms base, linear", cfg.retry.base_delay_ms);

    Ok(())
}
