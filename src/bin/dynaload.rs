//! dynaload CLI - run YAML load jobs against a request log
//!
//! Every service request the loaders issue is written as one NDJSON line, to
//! stdout or to `--output`. Logs and the run summary go to stderr.

use clap::{Parser, Subcommand};
use dynaload::config::JobConfig;
use dynaload::loader::LoadSummary;
use dynaload::serialization::to_pretty_json;
use dynaload::service::NdjsonService;
use dynaload::TransformRegistry;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dynaload")]
#[command(version, about = "Bulk-load delimited and markup sources into a graph store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every mapping of a job
    Run {
        /// Path to the job YAML file
        #[arg(short, long)]
        job: PathBuf,

        /// Write requests here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write the run summary as JSON to this file
        #[arg(short, long)]
        summary: Option<PathBuf>,
    },

    /// Check a job without issuing any request
    Validate {
        /// Path to the job YAML file
        #[arg(short, long)]
        job: PathBuf,
    },

    /// List the transforms available to job files
    Transforms,
}

fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            job,
            output,
            summary,
        } => run_job(job, output, summary),
        Commands::Validate { job } => validate_job(job),
        Commands::Transforms => {
            for name in TransformRegistry::with_builtins().list_transforms() {
                println!("{}", name);
            }
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn run_job(job: PathBuf, output: Option<PathBuf>, summary_path: Option<PathBuf>) -> CliResult {
    let config = JobConfig::load_from_file(&job)?;
    let mut loader = config.compile(&TransformRegistry::with_builtins())?;

    let writer: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout())),
    };
    let mut service = NdjsonService::new(writer);
    let summary = loader.run(&mut service)?;
    let requests = service.requests_written();
    service.finish()?;

    print_summary(&summary, requests);
    if let Some(path) = summary_path {
        fs::write(&path, to_pretty_json(&summary)?)?;
        tracing::info!("Wrote summary to {}", path.display());
    }
    Ok(())
}

fn validate_job(job: PathBuf) -> CliResult {
    let config = JobConfig::load_from_file(&job)?;
    let loader = config.compile(&TransformRegistry::with_builtins())?;
    loader.validate()?;
    eprintln!(
        "{}: {} mapping(s) over {}",
        job.display(),
        loader.mapping_count(),
        config.source_path().display()
    );
    Ok(())
}

fn print_summary(summary: &LoadSummary, requests: usize) {
    for mapping in &summary.mappings {
        eprintln!(
            "{}: {} records, {} accepted ({} fallback), {} skipped, {} topologies, {} instances in {} batches",
            mapping.action,
            mapping.records,
            mapping.accepted(),
            mapping.accepted_fallback,
            mapping.skipped,
            mapping.topologies_created,
            mapping.instances_pushed,
            mapping.batches_pushed
        );
        if mapping.label_failures > 0 {
            eprintln!("  {} label request(s) failed", mapping.label_failures);
        }
    }
    eprintln!(
        "run {}: {} instances pushed, {} requests written",
        summary.run_id,
        summary.instances_pushed(),
        requests
    );
}
