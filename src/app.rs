use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ResolvedConfig;
use crate::dispatch::{self, DockSummary, Dispatcher, InterruptFlag};
use crate::engine::DockingEngine;
use crate::error::PipelineError;
use crate::extract::{self, ExtractSummary};
use crate::fetch::{self, FetchExecutor, FetchSummary, Fetcher, RetryPolicy};
use crate::ledger::ProgressLedger;
use crate::monitor::{FailureMonitor, MonitorPolicy};
use crate::scores::{self, ResultsReport};
use crate::splitter::{self, SplitInventory, SplitSummary};
use crate::store::Store;
use crate::timing::TimingTracker;

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub uri_list: Option<Utf8PathBuf>,
    pub out: Option<Utf8PathBuf>,
    pub workers: Option<usize>,
    pub debug: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub input: Option<Utf8PathBuf>,
    pub out: Option<Utf8PathBuf>,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct SplitOptions {
    pub input: Option<Utf8PathBuf>,
    pub out: Option<Utf8PathBuf>,
    pub workers: Option<usize>,
    pub force: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DockOptions {
    pub ligands: Option<Utf8PathBuf>,
    pub receptor: Option<Utf8PathBuf>,
    pub out: Option<Utf8PathBuf>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SplitResult {
    /// Set when splitting was skipped because the split directory was already populated.
    pub existing: Option<SplitInventory>,
    pub summary: Option<SplitSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrepareResult {
    pub fetch: FetchSummary,
    pub extract: ExtractSummary,
    pub split: SplitResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct DockResult {
    pub receptor: String,
    pub output_dir: String,
    pub state_file: String,
    pub summary: DockSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetResult {
    pub state_file: String,
    pub removed: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Forwards progress events to the log.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed = ?elapsed, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}

pub struct App<F: Fetcher, E: DockingEngine> {
    store: Store,
    config: ResolvedConfig,
    fetcher: F,
    engine: E,
    retry: Option<RetryPolicy>,
}

impl<F: Fetcher, E: DockingEngine> App<F, E> {
    pub fn new(store: Store, config: ResolvedConfig, fetcher: F, engine: E) -> Self {
        Self {
            store,
            config,
            fetcher,
            engine,
            retry: None,
        }
    }

    /// Overrides the retry policy derived from the config.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn fetch(
        &self,
        options: FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<FetchSummary, PipelineError> {
        let mut timing = TimingTracker::new("fetch");
        let summary = self.run_fetch(&options, &mut timing, sink)?;
        timing.set_processed(summary.downloaded);
        self.write_timing(timing);
        Ok(summary)
    }

    pub fn extract(
        &self,
        options: ExtractOptions,
        sink: &dyn ProgressSink,
    ) -> Result<ExtractSummary, PipelineError> {
        let mut timing = TimingTracker::new("extract");
        let summary = self.run_extract(&options, &mut timing, sink)?;
        timing.set_processed(summary.extracted);
        self.write_timing(timing);
        Ok(summary)
    }

    pub fn split(
        &self,
        options: SplitOptions,
        sink: &dyn ProgressSink,
    ) -> Result<SplitResult, PipelineError> {
        let mut timing = TimingTracker::new("split");
        let result = self.run_split(&options, &mut timing, sink)?;
        if let Some(summary) = &result.summary {
            timing.set_processed(summary.molecules);
        }
        self.write_timing(timing);
        Ok(result)
    }

    /// fetch, then extract, then split, using the configured directories.
    pub fn prepare(
        &self,
        force: bool,
        debug: bool,
        sink: &dyn ProgressSink,
    ) -> Result<PrepareResult, PipelineError> {
        let mut timing = TimingTracker::new("prepare");
        let fetch = self.run_fetch(
            &FetchOptions {
                debug,
                ..FetchOptions::default()
            },
            &mut timing,
            sink,
        )?;
        if let Some(reason) = &fetch.halted {
            warn!("downloads halted ({reason}); continuing with what was fetched");
        }
        let extract = self.run_extract(&ExtractOptions::default(), &mut timing, sink)?;
        let split = self.run_split(
            &SplitOptions {
                force,
                ..SplitOptions::default()
            },
            &mut timing,
            sink,
        )?;
        if let Some(summary) = &split.summary {
            timing.set_processed(summary.molecules);
        }
        self.write_timing(timing);
        Ok(PrepareResult {
            fetch,
            extract,
            split,
        })
    }

    pub fn dock(
        &self,
        options: DockOptions,
        interrupt: Option<InterruptFlag>,
        sink: &dyn ProgressSink,
    ) -> Result<DockResult, PipelineError> {
        let started = Instant::now();
        let mut timing = TimingTracker::new("dock");
        let mut docking = self.config.docking.clone();
        if let Some(receptor) = options.receptor {
            docking.receptor = receptor.into_std_path_buf();
        }
        let ligand_input = options
            .ligands
            .unwrap_or_else(|| self.store.split_dir().to_owned());
        let output_dir = options
            .out
            .unwrap_or_else(|| self.store.output_dir().to_owned());
        let batch_size = options.batch_size.unwrap_or(self.config.engine.batch_size);

        timing.start_step("discover");
        sink.event(ProgressEvent {
            message: format!("discovering ligands in {ligand_input}"),
            elapsed: None,
        });
        let ligands = dispatch::discover_ligands(ligand_input.as_std_path())?;

        let ledger = ProgressLedger::load(self.store.state_file().as_std_path());
        sink.event(ProgressEvent {
            message: format!(
                "{} ligands found; {} already recorded as docked",
                ligands.len(),
                ledger.len()
            ),
            elapsed: Some(started.elapsed()),
        });

        timing.start_step("dock");
        let ligand_root = dispatch::ligand_root(ligand_input.as_std_path());
        let mut dispatcher = Dispatcher::new(
            &self.engine,
            &docking,
            &ledger,
            &ligand_root,
            output_dir.as_std_path(),
            batch_size,
        );
        if let Some(flag) = interrupt {
            dispatcher = dispatcher.with_interrupt(flag);
        }
        let outcome = dispatcher.run(&ligands);
        if let Ok(summary) = &outcome {
            timing.set_processed(summary.docked);
        }
        self.write_timing(timing);
        let summary = outcome?;

        sink.event(ProgressEvent {
            message: format!(
                "docking finished: {} of {} ligands successful",
                summary.successful(),
                summary.total
            ),
            elapsed: Some(started.elapsed()),
        });
        Ok(DockResult {
            receptor: docking.receptor.display().to_string(),
            output_dir: output_dir.to_string(),
            state_file: self.store.state_file().to_string(),
            summary,
        })
    }

    pub fn reset_ledger(&self, sink: &dyn ProgressSink) -> Result<ResetResult, PipelineError> {
        let state_file = self.store.state_file();
        let removed = ProgressLedger::reset(state_file.as_std_path())?;
        sink.event(ProgressEvent {
            message: if removed {
                format!("removed docking state {state_file}")
            } else {
                format!("no docking state at {state_file}")
            },
            elapsed: None,
        });
        Ok(ResetResult {
            state_file: state_file.to_string(),
            removed,
        })
    }

    pub fn results(
        &self,
        outputs: Option<Utf8PathBuf>,
        top: Option<usize>,
        sink: &dyn ProgressSink,
    ) -> Result<ResultsReport, PipelineError> {
        let outputs = outputs.unwrap_or_else(|| self.store.output_dir().to_owned());
        sink.event(ProgressEvent {
            message: format!("reading docked poses from {outputs}"),
            elapsed: None,
        });
        scores::rank_results(outputs.as_std_path(), top)
    }

    fn run_fetch(
        &self,
        options: &FetchOptions,
        timing: &mut TimingTracker,
        sink: &dyn ProgressSink,
    ) -> Result<FetchSummary, PipelineError> {
        let started = Instant::now();
        let uri_list = options
            .uri_list
            .clone()
            .unwrap_or_else(|| self.store.uri_list().to_owned());
        let out = options
            .out
            .clone()
            .unwrap_or_else(|| self.store.raw_dir().to_owned());
        let workers = options.workers.unwrap_or(self.config.fetch.workers);

        timing.start_step("fetch");
        let jobs = fetch::read_uri_list(uri_list.as_std_path(), out.as_std_path())?;
        sink.event(ProgressEvent {
            message: format!("downloading {} files into {out}", jobs.len()),
            elapsed: None,
        });

        let policy = MonitorPolicy {
            debug: options.debug || self.config.monitor.debug,
            ..self.config.monitor
        };
        let monitor = FailureMonitor::new(policy);
        let retry = self
            .retry
            .unwrap_or_else(|| RetryPolicy::with_max_retries(self.config.fetch.max_retries));
        let summary = FetchExecutor::new(&self.fetcher, &monitor, retry, workers).run(&jobs)?;
        sink.event(ProgressEvent {
            message: format!(
                "downloads finished: {} downloaded, {} skipped, {} failed",
                summary.downloaded, summary.skipped, summary.failed
            ),
            elapsed: Some(started.elapsed()),
        });
        Ok(summary)
    }

    fn run_extract(
        &self,
        options: &ExtractOptions,
        timing: &mut TimingTracker,
        sink: &dyn ProgressSink,
    ) -> Result<ExtractSummary, PipelineError> {
        let started = Instant::now();
        let input = options
            .input
            .clone()
            .unwrap_or_else(|| self.store.raw_dir().to_owned());
        let out = options
            .out
            .clone()
            .unwrap_or_else(|| self.store.pdbqt_dir().to_owned());
        let workers = options.workers.unwrap_or(self.config.extract_workers);

        timing.start_step("extract");
        let summary = extract::extract_directory(input.as_std_path(), out.as_std_path(), workers)?;
        sink.event(ProgressEvent {
            message: format!(
                "extraction finished: {} extracted, {} skipped, {} failed",
                summary.extracted, summary.skipped, summary.failed
            ),
            elapsed: Some(started.elapsed()),
        });
        Ok(summary)
    }

    fn run_split(
        &self,
        options: &SplitOptions,
        timing: &mut TimingTracker,
        sink: &dyn ProgressSink,
    ) -> Result<SplitResult, PipelineError> {
        let started = Instant::now();
        let input = options
            .input
            .clone()
            .unwrap_or_else(|| self.store.pdbqt_dir().to_owned());
        let out = options
            .out
            .clone()
            .unwrap_or_else(|| self.store.split_dir().to_owned());
        let workers = options.workers.unwrap_or(self.config.extract_workers);

        timing.start_step("split");
        if options.force {
            Store::clear_dir(out.as_std_path())?;
        } else {
            let existing = splitter::inventory(out.as_std_path())?;
            if existing.molecules > 0 {
                sink.event(ProgressEvent {
                    message: format!(
                        "{out} already holds {} molecules in {} tranches; skipping split",
                        existing.molecules, existing.tranches
                    ),
                    elapsed: None,
                });
                return Ok(SplitResult {
                    existing: Some(existing),
                    summary: None,
                });
            }
        }

        let summary = splitter::split_directory(input.as_std_path(), out.as_std_path(), workers)?;
        sink.event(ProgressEvent {
            message: format!(
                "split {} molecules into {} tranches",
                summary.molecules, summary.tranches
            ),
            elapsed: Some(started.elapsed()),
        });
        Ok(SplitResult {
            existing: None,
            summary: Some(summary),
        })
    }

    fn write_timing(&self, timing: TimingTracker) {
        if let Err(err) = timing.finish_and_write(self.store.timing_dir().as_std_path()) {
            warn!("could not write timing report: {err}");
        }
    }
}
