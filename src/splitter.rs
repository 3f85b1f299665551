use std::collections::{BTreeSet, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{RECORD_SUFFIX, Tranche};
use crate::error::PipelineError;
use crate::store;

pub const MODEL_MARKER: &str = "MODEL";
pub const END_MARKER: &str = "ENDMDL";
pub const NAME_MARKER: &str = "REMARK  Name =";

static ZINC_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bZINC\d+\b").unwrap());

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub name: Option<String>,
    pub lines: Vec<String>,
}

impl Record {
    /// Body lines without container markers.
    pub fn clean_lines(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .map(String::as_str)
            .filter(|line| !is_container_marker(line))
    }

    /// False for a record holding nothing but container markers, e.g. a truncated `MODEL 3`.
    pub fn has_body(&self) -> bool {
        self.clean_lines().any(|line| !line.trim().is_empty())
    }
}

pub fn is_container_marker(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with(MODEL_MARKER) || trimmed.starts_with(END_MARKER)
}

/// Line-at-a-time record parser; feed lines with [`RecordParser::push_line`].
///
/// A record opens at a `MODEL` line, or at a `REMARK  Name =` line outside any record,
/// and closes at `ENDMDL`. A record still open at end of input is kept.
#[derive(Debug, Default)]
pub struct RecordParser {
    current: Option<Record>,
}

impl RecordParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a record when `line` completes one.
    pub fn push_line(&mut self, line: &str) -> Option<Record> {
        let line = line.trim_end();
        let marker = line.trim_start();

        if marker.starts_with(MODEL_MARKER) {
            let finished = self.current.take().filter(|record| !record.lines.is_empty());
            self.current = Some(Record {
                name: None,
                lines: vec![line.to_string()],
            });
            return finished;
        }

        if let Some(value) = marker.strip_prefix(NAME_MARKER) {
            let record = self.current.get_or_insert_with(Record::default);
            record.name = Some(value.trim().to_string());
            record.lines.push(line.to_string());
            return None;
        }

        if marker.starts_with(END_MARKER) {
            // a stray end marker outside a record carries no molecule
            let mut record = self.current.take()?;
            record.lines.push(line.to_string());
            return Some(record);
        }

        if let Some(record) = self.current.as_mut() {
            record.lines.push(line.to_string());
        }
        None
    }

    /// Flushes an unterminated trailing record.
    pub fn finish(self) -> Option<Record> {
        self.current.filter(|record| !record.lines.is_empty())
    }
}

pub fn parse_records<R: BufRead>(reader: R) -> io::Result<Vec<Record>> {
    let mut parser = RecordParser::new();
    let mut records = Vec::new();
    for line in reader.lines() {
        if let Some(record) = parser.push_line(&line?) {
            records.push(record);
        }
    }
    records.extend(parser.finish());
    Ok(records)
}

/// Keeps alphanumerics plus `.`, `_` and `-`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|ch| ch.is_alphanumeric() || matches!(ch, '.' | '_' | '-'))
        .collect()
}

/// File stem for a record: sanitized name, else a ZINC id in the body, else the index.
pub fn record_stem(record: &Record, index: usize) -> String {
    if let Some(name) = record
        .name
        .as_deref()
        .map(sanitize_name)
        .filter(|name| !name.is_empty() && name != "." && name != "..")
    {
        return name;
    }
    let body_id = record
        .clean_lines()
        .filter(|line| line.starts_with("REMARK"))
        .find_map(|line| ZINC_ID.find(line).map(|found| found.as_str().to_string()));
    if let Some(id) = body_id {
        return id;
    }
    format!("molecule_{index:06}")
}

#[derive(Debug, Clone, Serialize)]
pub struct FileSplit {
    pub source: PathBuf,
    pub tranche: Tranche,
    pub records: usize,
    pub renamed: usize,
    pub empty_records: usize,
}

/// Splits one source file. Only one worker ever handles a given file.
pub fn split_file(source: &Path, output_dir: &Path) -> Result<FileSplit, PipelineError> {
    let file_name = source
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| PipelineError::MalformedRecords {
            path: source.to_path_buf(),
            message: "non-utf8 file name".to_string(),
        })?;
    let tranche = Tranche::from_file_name(file_name);
    let tranche_dir = output_dir.join(tranche.as_str());
    store::ensure_dir(&tranche_dir)?;

    let file = fs::File::open(source)
        .map_err(|err| PipelineError::Filesystem(format!("open {}: {err}", source.display())))?;
    let mut parser = RecordParser::new();
    let mut claimed = HashSet::new();
    let mut split = FileSplit {
        source: source.to_path_buf(),
        tranche,
        records: 0,
        renamed: 0,
        empty_records: 0,
    };

    let io_error = |err: io::Error| PipelineError::MalformedRecords {
        path: source.to_path_buf(),
        message: err.to_string(),
    };
    for line in BufReader::new(file).lines() {
        if let Some(record) = parser.push_line(&line.map_err(io_error)?) {
            write_record(&record, &tranche_dir, &mut claimed, &mut split)?;
        }
    }
    if let Some(record) = parser.finish() {
        write_record(&record, &tranche_dir, &mut claimed, &mut split)?;
    }

    if split.records == 0 {
        return Err(PipelineError::MalformedRecords {
            path: source.to_path_buf(),
            message: "no molecule records found".to_string(),
        });
    }
    Ok(split)
}

fn write_record(
    record: &Record,
    tranche_dir: &Path,
    claimed: &mut HashSet<String>,
    split: &mut FileSplit,
) -> Result<(), PipelineError> {
    if !record.has_body() {
        split.empty_records += 1;
        debug!(source = %split.source.display(), "skipping record without atoms");
        return Ok(());
    }
    let stem = record_stem(record, split.records);
    let (file, path, renamed) = create_unique(tranche_dir, &stem, claimed)?;
    let mut writer = BufWriter::new(file);
    for line in record.clean_lines() {
        writeln!(writer, "{line}")
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    }
    writer
        .flush()
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;

    split.records += 1;
    if renamed {
        split.renamed += 1;
        debug!(stem, path = %path.display(), "duplicate molecule name disambiguated");
    }
    Ok(())
}

const MAX_NAME_SUFFIX: usize = 100_000;

/// Creates `stem.pdbqt`, or `stem_2.pdbqt`, `stem_3.pdbqt`, ... when taken, either by this
/// file or by anything already on disk. `create_new` makes the claim atomic across workers
/// sharing a tranche directory.
fn create_unique(
    dir: &Path,
    stem: &str,
    claimed: &mut HashSet<String>,
) -> Result<(fs::File, PathBuf, bool), PipelineError> {
    for counter in 1..=MAX_NAME_SUFFIX {
        let candidate = if counter == 1 {
            stem.to_string()
        } else {
            format!("{stem}_{counter}")
        };
        if claimed.contains(&candidate) {
            continue;
        }
        let path = dir.join(format!("{candidate}{RECORD_SUFFIX}"));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                claimed.insert(candidate);
                return Ok((file, path, counter > 1));
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(PipelineError::Filesystem(format!(
                    "create {}: {err}",
                    path.display()
                )));
            }
        }
    }
    Err(PipelineError::Filesystem(format!(
        "could not find a free file name for {stem} in {}",
        dir.display()
    )))
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SplitSummary {
    pub molecules: usize,
    pub failed_files: usize,
    pub tranches: usize,
    pub renamed: usize,
    pub empty_records: usize,
    pub tranche_names: Vec<String>,
}

/// Splits every `*.pdbqt` in `input_dir` into `output_dir/<tranche>/`.
pub fn split_directory(
    input_dir: &Path,
    output_dir: &Path,
    workers: usize,
) -> Result<SplitSummary, PipelineError> {
    if !input_dir.is_dir() {
        return Err(PipelineError::MissingInput(input_dir.to_path_buf()));
    }
    store::ensure_dir(output_dir)?;
    let sources = store::files_with_suffix(input_dir, &[RECORD_SUFFIX])?;
    if sources.is_empty() {
        warn!(dir = %input_dir.display(), "no .pdbqt files to split");
        return Ok(SplitSummary::default());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|err| PipelineError::WorkerPool(err.to_string()))?;
    info!(files = sources.len(), workers, "splitting record files");

    let results: Vec<Result<FileSplit, PipelineError>> = pool.install(|| {
        sources
            .par_iter()
            .map(|source| split_file(source, output_dir))
            .collect()
    });

    let mut summary = SplitSummary::default();
    let mut tranches = BTreeSet::new();
    for result in results {
        match result {
            Ok(split) => {
                debug!(
                    source = %split.source.display(),
                    records = split.records,
                    tranche = %split.tranche,
                    "split"
                );
                summary.molecules += split.records;
                summary.renamed += split.renamed;
                summary.empty_records += split.empty_records;
                tranches.insert(split.tranche.as_str().to_string());
            }
            Err(err) => {
                warn!("split failed: {err}");
                summary.failed_files += 1;
            }
        }
    }
    summary.tranches = tranches.len();
    summary.tranche_names = tranches.into_iter().collect();
    info!(
        molecules = summary.molecules,
        failed_files = summary.failed_files,
        tranches = summary.tranches,
        "splitting finished"
    );
    Ok(summary)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SplitInventory {
    pub tranches: usize,
    pub molecules: usize,
}

/// Counts tranche directories that already hold split molecules.
pub fn inventory(split_dir: &Path) -> Result<SplitInventory, PipelineError> {
    let mut inventory = SplitInventory::default();
    if !split_dir.is_dir() {
        return Ok(inventory);
    }
    for dir in store::subdirectories(split_dir)? {
        let molecules = store::files_with_suffix(&dir, &[RECORD_SUFFIX])?.len();
        if molecules > 0 {
            inventory.tranches += 1;
            inventory.molecules += molecules;
        }
    }
    Ok(inventory)
}
