use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use tranche_dock::app::{
    App, DockOptions, ExtractOptions, FetchOptions, LogSink, ProgressSink, SplitOptions,
};
use tranche_dock::config::{ConfigLoader, ResolvedConfig};
use tranche_dock::domain::DockingConfig;
use tranche_dock::engine::{DockingEngine, EngineExit, UniDockEngine};
use tranche_dock::error::PipelineError;
use tranche_dock::fetch::{Fetcher, HttpFetcher};
use tranche_dock::output::{self, JsonOutput, OutputMode};
use tranche_dock::store::Store;

#[derive(Parser)]
#[command(name = "tranche-dock")]
#[command(about = "Resumable virtual screening: fetch ZINC tranches, split, dock and rank")]
#[command(version, author)]
struct Cli {
    /// Project config file (defaults to ./tranche-dock.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print machine-readable JSON summaries on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download compressed tranche files listed in the URI list")]
    Fetch(FetchArgs),
    #[command(about = "Decompress downloaded .pdbqt.gz files")]
    Extract(ExtractArgs),
    #[command(about = "Split multi-molecule files into one file per ligand")]
    Split(SplitArgs),
    #[command(about = "Run fetch, extract and split in sequence")]
    Prepare(PrepareArgs),
    #[command(about = "Dock ligands against the receptor, resuming previous runs")]
    Dock(DockArgs),
    #[command(about = "Rank docked ligands by best affinity")]
    Results(ResultsArgs),
}

#[derive(Args)]
struct FetchArgs {
    #[arg(long)]
    uri_list: Option<Utf8PathBuf>,
    #[arg(long)]
    out: Option<Utf8PathBuf>,
    #[arg(long)]
    workers: Option<usize>,
    /// Halt after 5 consecutive failures
    #[arg(long)]
    debug: bool,
}

#[derive(Args)]
struct ExtractArgs {
    #[arg(long)]
    input: Option<Utf8PathBuf>,
    #[arg(long)]
    out: Option<Utf8PathBuf>,
    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Args)]
struct SplitArgs {
    #[arg(long)]
    input: Option<Utf8PathBuf>,
    #[arg(long)]
    out: Option<Utf8PathBuf>,
    #[arg(long)]
    workers: Option<usize>,
    /// Clear the split directory and split again
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct PrepareArgs {
    #[arg(long)]
    force: bool,
    #[arg(long)]
    debug: bool,
}

#[derive(Args)]
struct DockArgs {
    /// Discard the docking state and exit
    #[arg(long)]
    reset: bool,
    /// Ligand file or directory
    #[arg(long)]
    ligands: Option<Utf8PathBuf>,
    #[arg(long)]
    receptor: Option<Utf8PathBuf>,
    #[arg(long)]
    out: Option<Utf8PathBuf>,
    #[arg(long)]
    batch_size: Option<usize>,
}

#[derive(Args)]
struct ResultsArgs {
    #[arg(long)]
    outputs: Option<Utf8PathBuf>,
    #[arg(long)]
    top: Option<usize>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<PipelineError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PipelineError) -> u8 {
    match error {
        PipelineError::ConfigRead(_)
        | PipelineError::ConfigParse(_)
        | PipelineError::ConfigValue(_)
        | PipelineError::MissingUriList(_)
        | PipelineError::EmptyUriList(_)
        | PipelineError::MissingReceptor(_)
        | PipelineError::NoLigands(_)
        | PipelineError::MissingInput(_) => 2,
        PipelineError::MissingTool(_) | PipelineError::EngineLaunch(_) => 3,
        PipelineError::Interrupted(_) => 130,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let store = Store::new(config.paths.clone());
    let started = Instant::now();

    match cli.command {
        Commands::Fetch(args) => {
            let fetcher = http_fetcher(&config)?;
            let app = App::new(store, config, fetcher, NopEngine);
            let options = FetchOptions {
                uri_list: args.uri_list,
                out: args.out,
                workers: args.workers,
                debug: args.debug,
            };
            let result = app.fetch(options, sink_for(output_mode))?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_fetch(&result).into_diagnostic()?,
                OutputMode::Human => output::print_fetch_summary(&result),
            }
        }
        Commands::Extract(args) => {
            let app = App::new(store, config, NopFetcher, NopEngine);
            let options = ExtractOptions {
                input: args.input,
                out: args.out,
                workers: args.workers,
            };
            let result = app.extract(options, sink_for(output_mode))?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_extract(&result).into_diagnostic()?,
                OutputMode::Human => output::print_extract_summary(&result),
            }
        }
        Commands::Split(args) => {
            let app = App::new(store, config, NopFetcher, NopEngine);
            let options = SplitOptions {
                input: args.input,
                out: args.out,
                workers: args.workers,
                force: args.force,
            };
            let result = app.split(options, sink_for(output_mode))?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_split(&result).into_diagnostic()?,
                OutputMode::Human => output::print_split_summary(&result),
            }
        }
        Commands::Prepare(args) => {
            let fetcher = http_fetcher(&config)?;
            let app = App::new(store, config, fetcher, NopEngine);
            let result = app.prepare(args.force, args.debug, sink_for(output_mode))?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_prepare(&result).into_diagnostic()?,
                OutputMode::Human => output::print_prepare_summary(&result),
            }
        }
        Commands::Dock(args) if args.reset => {
            let app = App::new(store, config, NopFetcher, NopEngine);
            let result = app.reset_ledger(sink_for(output_mode))?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_reset(&result).into_diagnostic()?,
                OutputMode::Human => output::print_reset_summary(&result),
            }
        }
        Commands::Dock(args) => {
            let engine = UniDockEngine::new(
                &config.engine.executable,
                Some(config.engine.max_gpu_memory_mb),
            )?;
            let interrupt = Arc::new(AtomicBool::new(false));
            let handler_flag = Arc::clone(&interrupt);
            ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst))
                .into_diagnostic()?;

            let app = App::new(store, config, NopFetcher, engine);
            let options = DockOptions {
                ligands: args.ligands,
                receptor: args.receptor,
                out: args.out,
                batch_size: args.batch_size,
            };
            let result = app.dock(options, Some(interrupt), sink_for(output_mode))?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_dock(&result).into_diagnostic()?,
                OutputMode::Human => output::print_dock_summary(&result),
            }
        }
        Commands::Results(args) => {
            let app = App::new(store, config, NopFetcher, NopEngine);
            let result = app.results(args.outputs, args.top, sink_for(output_mode))?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_results(&result).into_diagnostic()?,
                OutputMode::Human => output::print_results_summary(&result),
            }
        }
    }

    if matches!(output_mode, OutputMode::Human) {
        output::print_elapsed(started.elapsed().as_secs_f64());
    }
    Ok(())
}

fn sink_for(mode: OutputMode) -> &'static dyn ProgressSink {
    match mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Human => &LogSink,
    }
}

fn http_fetcher(config: &ResolvedConfig) -> miette::Result<HttpFetcher> {
    Ok(HttpFetcher::new(Duration::from_secs(
        config.fetch.timeout_secs,
    ))?)
}

struct NopFetcher;
struct NopEngine;

impl Fetcher for NopFetcher {
    fn fetch(&self, _url: &str, _destination: &Path) -> Result<u64, PipelineError> {
        Err(PipelineError::Http("fetcher not configured".to_string()))
    }
}

impl DockingEngine for NopEngine {
    fn dock_batch(
        &self,
        _config: &DockingConfig,
        _ligand_index: &Path,
        _output_dir: &Path,
    ) -> Result<EngineExit, PipelineError> {
        Err(PipelineError::EngineLaunch(
            "docking engine not configured".to_string(),
        ))
    }

    fn dock_single(
        &self,
        _config: &DockingConfig,
        _ligand: &Path,
        _output_file: &Path,
    ) -> Result<EngineExit, PipelineError> {
        Err(PipelineError::EngineLaunch(
            "docking engine not configured".to_string(),
        ))
    }
}
