use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use camino::Utf8Path;
use tempfile::NamedTempFile;

use crate::config::ProjectPaths;
use crate::error::PipelineError;

/// On-disk layout of one screening project.
#[derive(Debug, Clone)]
pub struct Store {
    paths: ProjectPaths,
}

impl Store {
    pub fn new(paths: ProjectPaths) -> Self {
        Self { paths }
    }

    pub fn uri_list(&self) -> &Utf8Path {
        &self.paths.uri_list
    }

    pub fn raw_dir(&self) -> &Utf8Path {
        &self.paths.raw_dir
    }

    pub fn pdbqt_dir(&self) -> &Utf8Path {
        &self.paths.pdbqt_dir
    }

    pub fn split_dir(&self) -> &Utf8Path {
        &self.paths.split_dir
    }

    pub fn output_dir(&self) -> &Utf8Path {
        &self.paths.output_dir
    }

    pub fn state_file(&self) -> &Utf8Path {
        &self.paths.state_file
    }

    pub fn timing_dir(&self) -> &Utf8Path {
        &self.paths.timing_dir
    }

    pub fn clear_dir(path: &Path) -> Result<(), PipelineError> {
        if path.exists() {
            fs::remove_dir_all(path).map_err(|err| {
                PipelineError::Filesystem(format!("remove {}: {err}", path.display()))
            })?;
        }
        Ok(())
    }
}

pub fn ensure_dir(path: &Path) -> Result<(), PipelineError> {
    fs::create_dir_all(path)
        .map_err(|err| PipelineError::Filesystem(format!("create {}: {err}", path.display())))
}

/// A file counts as a finished artifact only when it exists and is non-empty.
pub fn is_nonempty_file(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

/// Temp file next to `dest`, so the final rename stays on one filesystem.
pub fn temp_file_for(dest: &Path) -> Result<NamedTempFile, PipelineError> {
    let parent = dest
        .parent()
        .ok_or_else(|| PipelineError::Filesystem("invalid destination path".to_string()))?;
    ensure_dir(parent)?;
    tempfile::Builder::new()
        .prefix(".tranche-dock")
        .tempfile_in(parent)
        .map_err(|err| PipelineError::Filesystem(err.to_string()))
}

pub fn persist(temp: NamedTempFile, dest: &Path) -> Result<(), PipelineError> {
    temp.persist(dest)
        .map_err(|err| PipelineError::Filesystem(format!("persist {}: {err}", dest.display())))?;
    Ok(())
}

pub fn write_bytes_atomic(dest: &Path, content: &[u8]) -> Result<(), PipelineError> {
    let mut temp = temp_file_for(dest)?;
    temp.write_all(content)
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    temp.as_file()
        .sync_all()
        .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
    persist(temp, dest)
}

/// Regular files directly inside `dir` whose name ends with one of `suffixes`, sorted.
pub fn files_with_suffix(dir: &Path, suffixes: &[&str]) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = fs::read_dir(dir)
        .map_err(|err| PipelineError::Filesystem(format!("read {}: {err}", dir.display())))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| suffixes.iter().any(|suffix| name.ends_with(suffix)))
            .unwrap_or(false);
        if matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = fs::read_dir(dir)
        .map_err(|err| PipelineError::Filesystem(format!("read {}: {err}", dir.display())))?;
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

