use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::COMPRESSED_SUFFIX;
use crate::error::PipelineError;
use crate::fs_util;
use crate::store;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractSummary {
    pub extracted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outputs: Vec<PathBuf>,
}

enum ExtractOutcome {
    Extracted(PathBuf),
    Skipped(PathBuf),
    Failed,
}

/// Decompresses every `*.pdbqt.gz` in `raw_dir` into `output_dir`.
pub fn extract_directory(
    raw_dir: &Path,
    output_dir: &Path,
    workers: usize,
) -> Result<ExtractSummary, PipelineError> {
    if !raw_dir.is_dir() {
        return Err(PipelineError::MissingInput(raw_dir.to_path_buf()));
    }
    store::ensure_dir(output_dir)?;
    let archives = store::files_with_suffix(raw_dir, &[COMPRESSED_SUFFIX])?;
    if archives.is_empty() {
        warn!(dir = %raw_dir.display(), "no .pdbqt.gz files to extract");
        return Ok(ExtractSummary::default());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|err| PipelineError::WorkerPool(err.to_string()))?;
    info!(files = archives.len(), workers, "extracting archives");

    let outcomes: Vec<ExtractOutcome> = pool.install(|| {
        archives
            .par_iter()
            .map(|archive| extract_one(archive, output_dir))
            .collect()
    });

    let mut summary = ExtractSummary::default();
    for outcome in outcomes {
        match outcome {
            ExtractOutcome::Extracted(path) => {
                summary.extracted += 1;
                summary.outputs.push(path);
            }
            ExtractOutcome::Skipped(path) => {
                summary.skipped += 1;
                summary.outputs.push(path);
            }
            ExtractOutcome::Failed => summary.failed += 1,
        }
    }
    summary.outputs.sort();
    info!(
        extracted = summary.extracted,
        skipped = summary.skipped,
        failed = summary.failed,
        "extraction finished"
    );
    Ok(summary)
}

fn extract_one(archive: &Path, output_dir: &Path) -> ExtractOutcome {
    let Some(file_name) = archive.file_name().and_then(|name| name.to_str()) else {
        return ExtractOutcome::Failed;
    };
    let dest = output_dir.join(fs_util::strip_gz_suffix(file_name));
    if store::is_nonempty_file(&dest) {
        debug!(file = file_name, "already extracted");
        return ExtractOutcome::Skipped(dest);
    }
    match fs_util::gunzip_file(archive, &dest) {
        Ok(bytes) => {
            debug!(file = file_name, bytes, "extracted");
            ExtractOutcome::Extracted(dest)
        }
        Err(err) => {
            warn!(file = file_name, "extraction failed: {err}");
            ExtractOutcome::Failed
        }
    }
}
