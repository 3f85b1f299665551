use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{DockingConfig, RECORD_SUFFIX, expected_output, ligand_key, output_dir_for};
use crate::engine::{DockingEngine, EngineExit};
use crate::error::PipelineError;
use crate::ledger::ProgressLedger;
use crate::store;

pub const LIGAND_INDEX_FILE: &str = "ligand_index.txt";

/// Set from a signal handler; checked between chunks and after each invocation.
pub type InterruptFlag = Arc<AtomicBool>;

#[derive(Debug, Clone, Default, Serialize)]
pub struct DockSummary {
    pub total: usize,
    pub previously_completed: usize,
    pub already_docked: usize,
    pub docked: usize,
    pub failed: usize,
    pub invocations: usize,
    pub failures: Vec<String>,
}

impl DockSummary {
    pub fn successful(&self) -> usize {
        self.previously_completed + self.already_docked + self.docked
    }
}

struct ChunkResult<'l> {
    succeeded: Vec<&'l Path>,
    failed: Vec<&'l Path>,
    interrupted: bool,
}

/// Resumable docking over a ligand set. A ligand is skipped when the ledger lists it or
/// when its output file already exists with non-zero size; the rest are docked in chunks
/// and the ledger is saved after every chunk.
///
/// Outputs mirror the ligand layout under `ligand_root`, so every tranche docks into its own
/// subdirectory of `output_dir` and equal file names in different tranches stay apart.
pub struct Dispatcher<'a, E: DockingEngine> {
    engine: &'a E,
    config: &'a DockingConfig,
    ledger: &'a ProgressLedger,
    ligand_root: PathBuf,
    output_dir: PathBuf,
    batch_size: usize,
    interrupt: Option<InterruptFlag>,
}

impl<'a, E: DockingEngine> Dispatcher<'a, E> {
    pub fn new(
        engine: &'a E,
        config: &'a DockingConfig,
        ledger: &'a ProgressLedger,
        ligand_root: &Path,
        output_dir: &Path,
        batch_size: usize,
    ) -> Self {
        Self {
            engine,
            config,
            ledger,
            ligand_root: ligand_root.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            batch_size: batch_size.max(1),
            interrupt: None,
        }
    }

    pub fn with_interrupt(mut self, flag: InterruptFlag) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn run(&self, ligands: &[PathBuf]) -> Result<DockSummary, PipelineError> {
        if !self.config.receptor.is_file() {
            return Err(PipelineError::MissingReceptor(self.config.receptor.clone()));
        }
        store::ensure_dir(&self.output_dir)?;

        let mut summary = DockSummary {
            total: ligands.len(),
            ..DockSummary::default()
        };
        let mut owners: HashMap<PathBuf, &Path> = HashMap::new();
        let mut pending: BTreeMap<PathBuf, Vec<&Path>> = BTreeMap::new();
        for ligand in ligands {
            let key = ligand_key(ligand);
            let output = self.output_for(ligand);
            let owner = *owners.entry(output.clone()).or_insert(ligand.as_path());
            if self.ledger.is_completed(&key) {
                summary.previously_completed += 1;
            } else if owner != ligand.as_path() {
                // never dock two ligands into one output file
                warn!(
                    ligand = %ligand.display(),
                    owner = %owner.display(),
                    output = %output.display(),
                    "docked output name already belongs to another ligand"
                );
                summary.failed += 1;
                summary.failures.push(ligand.display().to_string());
            } else if store::is_nonempty_file(&output) {
                summary.already_docked += 1;
                self.ledger.mark_completed(&key);
            } else {
                pending
                    .entry(output_dir_for(ligand, &self.ligand_root, &self.output_dir))
                    .or_default()
                    .push(ligand.as_path());
            }
        }
        if summary.already_docked > 0 {
            self.ledger.save_or_warn();
        }
        info!(
            completed = summary.previously_completed + summary.already_docked,
            remaining = pending.values().map(Vec::len).sum::<usize>(),
            output_dirs = pending.len(),
            "resume state"
        );

        for (dir, group) in &pending {
            store::ensure_dir(dir)?;
            for chunk in group.chunks(self.batch_size) {
                if self.interrupted() {
                    return Err(self.stop());
                }
                let result = if let [ligand] = chunk {
                    self.dock_one(*ligand)
                } else {
                    self.dock_chunk(dir, chunk)?
                };
                summary.invocations += 1;

                for ligand in &result.succeeded {
                    self.ledger.mark_completed(&ligand_key(ligand));
                }
                summary.docked += result.succeeded.len();
                summary.failed += result.failed.len();
                summary
                    .failures
                    .extend(result.failed.iter().map(|path| path.display().to_string()));
                self.ledger.save_or_warn();

                info!(
                    dir = %dir.display(),
                    succeeded = result.succeeded.len(),
                    failed = result.failed.len(),
                    "docking invocation finished"
                );
                if result.interrupted || self.interrupted() {
                    return Err(self.stop());
                }
            }
        }

        Ok(summary)
    }

    fn output_for(&self, ligand: &Path) -> PathBuf {
        expected_output(ligand, &self.ligand_root, &self.output_dir)
    }

    /// Docks ligands sharing one output directory in a single engine invocation.
    fn dock_chunk<'l>(
        &self,
        dir: &Path,
        chunk: &[&'l Path],
    ) -> Result<ChunkResult<'l>, PipelineError> {
        let index_path = dir.join(LIGAND_INDEX_FILE);
        let mut index = String::new();
        for ligand in chunk {
            index.push_str(&ligand_key(ligand));
            index.push('\n');
        }
        store::write_bytes_atomic(&index_path, index.as_bytes())?;

        let interrupted = match self.engine.dock_batch(self.config, &index_path, dir) {
            Ok(EngineExit::Success) => false,
            Ok(EngineExit::Interrupted) => true,
            Ok(EngineExit::Failed { code, stderr }) => {
                warn!(?code, "batch docking exited with failure: {stderr}");
                false
            }
            Err(err) => {
                warn!("batch docking could not run: {err}");
                return Ok(ChunkResult {
                    succeeded: Vec::new(),
                    failed: chunk.to_vec(),
                    interrupted: false,
                });
            }
        };

        let (succeeded, failed) = chunk
            .iter()
            .copied()
            .partition(|ligand| store::is_nonempty_file(&self.output_for(ligand)));
        Ok(ChunkResult {
            succeeded,
            failed,
            interrupted,
        })
    }

    fn dock_one<'l>(&self, ligand: &'l Path) -> ChunkResult<'l> {
        let output = self.output_for(ligand);
        let exit = match self.engine.dock_single(self.config, ligand, &output) {
            Ok(exit) => exit,
            Err(err) => {
                warn!(ligand = %ligand.display(), "docking could not run: {err}");
                EngineExit::Failed {
                    code: None,
                    stderr: err.to_string(),
                }
            }
        };
        let succeeded = exit.is_success() && store::is_nonempty_file(&output);
        if !succeeded {
            match &exit {
                EngineExit::Success => {
                    warn!(ligand = %ligand.display(), "engine exited cleanly but wrote no output")
                }
                EngineExit::Failed { code, stderr } => {
                    warn!(ligand = %ligand.display(), ?code, "docking failed: {stderr}")
                }
                EngineExit::Interrupted => {}
            }
        }
        ChunkResult {
            succeeded: if succeeded { vec![ligand] } else { Vec::new() },
            failed: if succeeded { Vec::new() } else { vec![ligand] },
            interrupted: exit == EngineExit::Interrupted,
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn stop(&self) -> PipelineError {
        self.ledger.save_or_warn();
        warn!(ledger = %self.ledger.path().display(), "docking interrupted");
        PipelineError::Interrupted(self.ledger.path().to_path_buf())
    }
}

/// Directory the ligand layout is mirrored from: the input itself, or the parent of a
/// single ligand file.
pub fn ligand_root(input: &Path) -> PathBuf {
    if input.is_file() {
        input.parent().map(Path::to_path_buf).unwrap_or_default()
    } else {
        input.to_path_buf()
    }
}

/// Ligands to dock from a file or directory.
///
/// A directory is first searched for tranche subdirectories holding `*.pdbqt` files;
/// without any, `*.pdbqt` and `*.sdf` files directly inside it are used.
pub fn discover_ligands(input: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        return Err(PipelineError::MissingInput(input.to_path_buf()));
    }

    let mut ligands = Vec::new();
    for tranche_dir in store::subdirectories(input)? {
        ligands.extend(store::files_with_suffix(&tranche_dir, &[RECORD_SUFFIX])?);
    }
    if ligands.is_empty() {
        ligands = store::files_with_suffix(input, &[RECORD_SUFFIX, ".sdf"])?;
    }
    if ligands.is_empty() {
        return Err(PipelineError::NoLigands(input.to_path_buf()));
    }
    Ok(ligands)
}
