use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{DockingConfig, ScoringFunction, SearchBox, SearchMode};
use crate::error::PipelineError;
use crate::monitor::MonitorPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "tranche-dock.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub fetch: FetchSection,
    #[serde(default)]
    pub extract: ExtractSection,
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub docking: DockingSection,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PathsSection {
    pub uri_list: Option<String>,
    pub raw_dir: Option<String>,
    pub pdbqt_dir: Option<String>,
    pub split_dir: Option<String>,
    pub receptor: Option<String>,
    pub output_dir: Option<String>,
    pub state_file: Option<String>,
    pub timing_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FetchSection {
    pub workers: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ExtractSection {
    pub workers: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct MonitorSection {
    pub max_consecutive_failures: Option<u64>,
    pub min_sample_size: Option<u64>,
    pub max_failure_rate: Option<f64>,
    pub debug: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DockingSection {
    pub engine: Option<String>,
    pub center: Option<[f64; 3]>,
    pub size: Option<[f64; 3]>,
    pub scoring: Option<ScoringFunction>,
    pub num_modes: Option<u32>,
    pub search_mode: Option<SearchMode>,
    pub batch_size: Option<usize>,
    pub max_gpu_memory_mb: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub uri_list: Utf8PathBuf,
    pub raw_dir: Utf8PathBuf,
    pub pdbqt_dir: Utf8PathBuf,
    pub split_dir: Utf8PathBuf,
    pub receptor: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub state_file: Utf8PathBuf,
    pub timing_dir: Utf8PathBuf,
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub workers: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub executable: String,
    pub batch_size: usize,
    pub max_gpu_memory_mb: u32,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub paths: ProjectPaths,
    pub fetch: FetchSettings,
    pub extract_workers: usize,
    pub monitor: MonitorPolicy,
    pub docking: DockingConfig,
    pub engine: EngineSettings,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist; without one, a missing default file means defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, PipelineError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| PipelineError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| PipelineError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, PipelineError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let paths = config.paths;
        let paths = ProjectPaths {
            uri_list: path_or(paths.uri_list, "data/ligands.uri"),
            raw_dir: path_or(paths.raw_dir, "data/ligands_raw"),
            pdbqt_dir: path_or(paths.pdbqt_dir, "data/ligands_pdbqt"),
            split_dir: path_or(paths.split_dir, "data/ligands_pdbqt_split"),
            receptor: path_or(paths.receptor, "data/receptor/receptor.pdbqt"),
            output_dir: path_or(paths.output_dir, "results/outputs"),
            state_file: path_or(paths.state_file, "results/docking_state.json"),
            timing_dir: path_or(paths.timing_dir, "results/timing_logs"),
        };

        let fetch = FetchSettings {
            workers: positive(config.fetch.workers.unwrap_or(8), "fetch.workers")?,
            timeout_secs: config.fetch.timeout_secs.unwrap_or(300),
            max_retries: config.fetch.max_retries.unwrap_or(3),
        };
        let extract_workers = positive(config.extract.workers.unwrap_or(4), "extract.workers")?;

        let defaults = MonitorPolicy::default();
        let max_failure_rate = config
            .monitor
            .max_failure_rate
            .unwrap_or(defaults.max_failure_rate);
        if !(0.0..=1.0).contains(&max_failure_rate) {
            return Err(PipelineError::ConfigValue(format!(
                "monitor.max_failure_rate must be within 0..1, got {max_failure_rate}"
            )));
        }
        let monitor = MonitorPolicy {
            max_consecutive_failures: config
                .monitor
                .max_consecutive_failures
                .unwrap_or(defaults.max_consecutive_failures),
            min_sample_size: config
                .monitor
                .min_sample_size
                .unwrap_or(defaults.min_sample_size),
            max_failure_rate,
            debug: config.monitor.debug.unwrap_or(defaults.debug),
        };

        let docking_section = config.docking;
        let docking = DockingConfig {
            receptor: paths.receptor.clone().into_std_path_buf(),
            search_box: SearchBox {
                center: docking_section
                    .center
                    .unwrap_or([42.328, 28.604, 21.648]),
                size: docking_section.size.unwrap_or([30.0, 30.0, 30.0]),
            },
            scoring: docking_section.scoring.unwrap_or(ScoringFunction::Vinardo),
            num_modes: docking_section.num_modes.unwrap_or(5),
            search_mode: docking_section.search_mode.unwrap_or(SearchMode::Balance),
        };
        if docking.num_modes == 0 {
            return Err(PipelineError::ConfigValue(
                "docking.num_modes must be greater than zero".to_string(),
            ));
        }
        if docking.search_box.size.iter().any(|value| *value <= 0.0) {
            return Err(PipelineError::ConfigValue(
                "docking.size values must be positive".to_string(),
            ));
        }
        let engine = EngineSettings {
            executable: docking_section
                .engine
                .unwrap_or_else(|| "unidock".to_string()),
            batch_size: positive(
                docking_section.batch_size.unwrap_or(1000),
                "docking.batch_size",
            )?,
            max_gpu_memory_mb: docking_section.max_gpu_memory_mb.unwrap_or(3000),
        };

        Ok(ResolvedConfig {
            schema_version,
            paths,
            fetch,
            extract_workers,
            monitor,
            docking,
            engine,
        })
    }
}

fn path_or(value: Option<String>, default: &str) -> Utf8PathBuf {
    Utf8PathBuf::from(value.unwrap_or_else(|| default.to_string()))
}

fn positive(value: usize, field: &str) -> Result<usize, PipelineError> {
    if value == 0 {
        return Err(PipelineError::ConfigValue(format!(
            "{field} must be greater than zero"
        )));
    }
    Ok(value)
}
