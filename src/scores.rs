use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::DOCKED_SUFFIX;
use crate::error::PipelineError;
use crate::store;

const VINA_RESULT: &str = "REMARK VINA RESULT:";

/// One binding pose's score. Modes are numbered from 1 in file order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRecord {
    pub ligand: String,
    /// Output subdirectory the pose was read from; `None` for the top level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tranche: Option<String>,
    pub mode: u32,
    pub affinity_kcal_mol: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultsReport {
    pub files: usize,
    pub unreadable: usize,
    pub poses: usize,
    /// Best pose per ligand, most negative affinity first.
    pub best: Vec<ScoreRecord>,
}

/// Affinities from `REMARK VINA RESULT:` lines, in order. Lines whose affinity field is
/// missing or not a number are skipped.
pub fn parse_vina_affinities(text: &str) -> Vec<f64> {
    text.lines()
        .filter(|line| line.starts_with(VINA_RESULT))
        .filter_map(|line| {
            let affinity = line.split_whitespace().nth(3)?;
            match affinity.parse::<f64>() {
                Ok(value) => Some(value),
                Err(_) => {
                    debug!(line, "unparseable affinity");
                    None
                }
            }
        })
        .collect()
}

pub fn parse_vina_scores(ligand: &str, text: &str) -> Vec<ScoreRecord> {
    parse_vina_affinities(text)
        .into_iter()
        .zip(1u32..)
        .map(|(affinity_kcal_mol, mode)| ScoreRecord {
            ligand: ligand.to_string(),
            tranche: None,
            mode,
            affinity_kcal_mol,
        })
        .collect()
}

/// `ZINC001_out.pdbqt` -> `ZINC001`
pub fn ligand_from_output(file_name: &str) -> &str {
    file_name.strip_suffix(DOCKED_SUFFIX).unwrap_or(file_name)
}

fn by_affinity(a: &ScoreRecord, b: &ScoreRecord) -> Ordering {
    a.affinity_kcal_mol
        .total_cmp(&b.affinity_kcal_mol)
        .then_with(|| a.tranche.cmp(&b.tranche))
        .then_with(|| a.ligand.cmp(&b.ligand))
        .then_with(|| a.mode.cmp(&b.mode))
}

/// Every pose in `*_out.pdbqt` files directly under `output_dir` or one tranche
/// subdirectory below it, sorted by affinity ascending.
pub fn collect_scores(output_dir: &Path) -> Result<(Vec<ScoreRecord>, ResultsReport), PipelineError> {
    if !output_dir.is_dir() {
        return Err(PipelineError::MissingInput(output_dir.to_path_buf()));
    }
    let mut files: Vec<(Option<String>, PathBuf)> = store::files_with_suffix(output_dir, &[DOCKED_SUFFIX])?
        .into_iter()
        .map(|file| (None, file))
        .collect();
    for dir in store::subdirectories(output_dir)? {
        let tranche = dir
            .file_name()
            .map(|name| name.to_string_lossy().to_string());
        files.extend(
            store::files_with_suffix(&dir, &[DOCKED_SUFFIX])?
                .into_iter()
                .map(|file| (tranche.clone(), file)),
        );
    }

    let mut report = ResultsReport {
        files: files.len(),
        ..ResultsReport::default()
    };
    let mut records = Vec::new();
    for (tranche, file) in &files {
        let Some(file_name) = file.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        match fs::read_to_string(file) {
            Ok(text) => records.extend(
                parse_vina_scores(ligand_from_output(file_name), &text)
                    .into_iter()
                    .map(|record| ScoreRecord {
                        tranche: tranche.clone(),
                        ..record
                    }),
            ),
            Err(err) => {
                warn!(file = %file.display(), "cannot read docked output: {err}");
                report.unreadable += 1;
            }
        }
    }
    records.sort_by(by_affinity);
    report.poses = records.len();
    Ok((records, report))
}

/// Best pose per ligand, keeping at most `top` ligands when given.
pub fn rank_results(output_dir: &Path, top: Option<usize>) -> Result<ResultsReport, PipelineError> {
    let (records, mut report) = collect_scores(output_dir)?;
    let mut seen = HashSet::new();
    report.best = records
        .into_iter()
        .filter(|record| seen.insert((record.tranche.clone(), record.ligand.clone())))
        .take(top.unwrap_or(usize::MAX))
        .collect();
    Ok(report)
}
