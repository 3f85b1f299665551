use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

pub const RECORD_SUFFIX: &str = ".pdbqt";
pub const COMPRESSED_SUFFIX: &str = ".pdbqt.gz";
pub const DOCKED_SUFFIX: &str = "_out.pdbqt";
pub const UNKNOWN_TRANCHE: &str = "unknown_tranche";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScoringFunction {
    Vina,
    Vinardo,
    Ad4,
}

impl fmt::Display for ScoringFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringFunction::Vina => write!(f, "vina"),
            ScoringFunction::Vinardo => write!(f, "vinardo"),
            ScoringFunction::Ad4 => write!(f, "ad4"),
        }
    }
}

impl FromStr for ScoringFunction {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "vina" => Ok(ScoringFunction::Vina),
            "vinardo" => Ok(ScoringFunction::Vinardo),
            "ad4" => Ok(ScoringFunction::Ad4),
            _ => Err(PipelineError::InvalidScoring(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Fast,
    Balance,
    Detail,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMode::Fast => write!(f, "fast"),
            SearchMode::Balance => write!(f, "balance"),
            SearchMode::Detail => write!(f, "detail"),
        }
    }
}

impl FromStr for SearchMode {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "fast" => Ok(SearchMode::Fast),
            "balance" => Ok(SearchMode::Balance),
            "detail" => Ok(SearchMode::Detail),
            _ => Err(PipelineError::InvalidSearchMode(value.to_string())),
        }
    }
}

/// Search space in Angstroms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchBox {
    pub center: [f64; 3],
    pub size: [f64; 3],
}

/// Parameters shared by every engine invocation in a run.
#[derive(Debug, Clone, PartialEq)]
pub struct DockingConfig {
    pub receptor: PathBuf,
    pub search_box: SearchBox,
    pub scoring: ScoringFunction,
    pub num_modes: u32,
    pub search_mode: SearchMode,
}

/// One download unit. Identity is the source URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DownloadJob {
    pub url: String,
    pub destination: PathBuf,
}

impl DownloadJob {
    /// `position` is the 1-based line position in the URI list, used when the URL has
    /// no usable file name.
    pub fn from_url(url: &str, output_dir: &Path, position: usize) -> Result<Self, PipelineError> {
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(PipelineError::InvalidUrl(url.to_string()));
        }
        let file_name = url
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .map(|name| name.to_string())
            .unwrap_or_else(|| format!("downloaded_ligand_{position}{COMPRESSED_SUFFIX}"));
        Ok(Self {
            url: url.to_string(),
            destination: output_dir.join(file_name),
        })
    }

}

/// Group of molecules sharing a source file prefix, e.g. `ACAAML.xaa`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Tranche(String);

impl Tranche {
    pub fn from_file_name(file_name: &str) -> Self {
        if file_name.contains(RECORD_SUFFIX) {
            let base = file_name
                .replace(COMPRESSED_SUFFIX, "")
                .replace(RECORD_SUFFIX, "");
            if base.contains('.') {
                return Self(base);
            }
        }
        Self(UNKNOWN_TRANCHE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tranche {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ledger identity of a ligand: its absolute path.
pub fn ligand_key(path: &Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .to_string()
}

pub fn ligand_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Directory receiving a ligand's docked output: `output_dir` mirrors the ligand's
/// directory relative to `ligand_root`, so `split/X.xaa/L.pdbqt` docks into `out/X.xaa/`.
/// Ligands outside `ligand_root` dock straight into `output_dir`.
pub fn output_dir_for(ligand: &Path, ligand_root: &Path, output_dir: &Path) -> PathBuf {
    match ligand
        .parent()
        .and_then(|parent| parent.strip_prefix(ligand_root).ok())
    {
        Some(relative) if !relative.as_os_str().is_empty() => output_dir.join(relative),
        _ => output_dir.to_path_buf(),
    }
}

pub fn expected_output(ligand: &Path, ligand_root: &Path, output_dir: &Path) -> PathBuf {
    output_dir_for(ligand, ligand_root, output_dir)
        .join(format!("{}{DOCKED_SUFFIX}", ligand_stem(ligand)))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn download_job_uses_last_segment() {
        let job = DownloadJob::from_url(
            "http://files.docking.org/3D/AC/AAML/ACAAML.xaa.pdbqt.gz",
            Path::new("raw"),
            1,
        )
        .unwrap();
        assert_eq!(job.destination, Path::new("raw/ACAAML.xaa.pdbqt.gz"));
    }

    #[test]
    fn download_job_trailing_slash() {
        let job = DownloadJob::from_url("http://files.docking.org/3D/AC/", Path::new("raw"), 7)
            .unwrap();
        assert_eq!(
            job.destination,
            Path::new("raw/downloaded_ligand_7.pdbqt.gz")
        );
    }

    #[test]
    fn download_job_rejects_non_http() {
        let err = DownloadJob::from_url("ftp://example.org/a.gz", Path::new("raw"), 1).unwrap_err();
        assert_matches!(err, PipelineError::InvalidUrl(_));
    }

    #[test]
    fn expected_output_strips_extension() {
        let out = expected_output(
            Path::new("split/ZINC001.pdbqt"),
            Path::new("split"),
            Path::new("out"),
        );
        assert_eq!(out, Path::new("out/ZINC001_out.pdbqt"));
    }

    #[test]
    fn expected_output_keeps_tranche_directory() {
        let root = Path::new("split");
        let out = Path::new("out");
        assert_eq!(
            expected_output(Path::new("split/X.xaa/molecule_000000.pdbqt"), root, out),
            Path::new("out/X.xaa/molecule_000000_out.pdbqt")
        );
        assert_ne!(
            expected_output(Path::new("split/X.xaa/molecule_000000.pdbqt"), root, out),
            expected_output(Path::new("split/Y.xab/molecule_000000.pdbqt"), root, out)
        );
        assert_eq!(
            expected_output(Path::new("elsewhere/L.sdf"), root, out),
            Path::new("out/L_out.pdbqt")
        );
    }
}
