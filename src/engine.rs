use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use tracing::debug;

use crate::domain::DockingConfig;
use crate::error::PipelineError;

/// How one engine invocation ended. Per-ligand success is judged from output files,
/// not from this value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineExit {
    Success,
    Failed { code: Option<i32>, stderr: String },
    Interrupted,
}

impl EngineExit {
    pub fn is_success(&self) -> bool {
        matches!(self, EngineExit::Success)
    }
}

/// Boundary to the external docking program. `Err` means the process could not be run.
pub trait DockingEngine {
    /// Docks every ligand listed (one absolute path per line) in `ligand_index`,
    /// writing `<stem>_out.pdbqt` files into `output_dir`.
    fn dock_batch(
        &self,
        config: &DockingConfig,
        ligand_index: &Path,
        output_dir: &Path,
    ) -> Result<EngineExit, PipelineError>;

    fn dock_single(
        &self,
        config: &DockingConfig,
        ligand: &Path,
        output_file: &Path,
    ) -> Result<EngineExit, PipelineError>;
}

/// Uni-Dock command-line adapter.
#[derive(Debug, Clone)]
pub struct UniDockEngine {
    executable: PathBuf,
    max_gpu_memory_mb: Option<u32>,
}

impl UniDockEngine {
    pub fn new(executable: &str, max_gpu_memory_mb: Option<u32>) -> Result<Self, PipelineError> {
        let candidate = PathBuf::from(executable);
        let executable = if candidate.components().count() > 1 {
            candidate.exists().then_some(candidate)
        } else {
            find_in_path(executable)
        }
        .ok_or_else(|| PipelineError::MissingTool(executable.to_string()))?;
        Ok(Self {
            executable,
            max_gpu_memory_mb,
        })
    }

    fn common_args(&self, config: &DockingConfig) -> Vec<String> {
        let [cx, cy, cz] = config.search_box.center;
        let [sx, sy, sz] = config.search_box.size;
        let mut args = vec![
            "--receptor".to_string(),
            absolute(&config.receptor),
            "--center_x".to_string(),
            cx.to_string(),
            "--center_y".to_string(),
            cy.to_string(),
            "--center_z".to_string(),
            cz.to_string(),
            "--size_x".to_string(),
            sx.to_string(),
            "--size_y".to_string(),
            sy.to_string(),
            "--size_z".to_string(),
            sz.to_string(),
            "--scoring".to_string(),
            config.scoring.to_string(),
            "--num_modes".to_string(),
            config.num_modes.to_string(),
            "--search_mode".to_string(),
            config.search_mode.to_string(),
        ];
        if let Some(memory) = self.max_gpu_memory_mb {
            args.push("--max_gpu_memory".to_string());
            args.push(memory.to_string());
        }
        args
    }

    fn run(&self, args: &[String]) -> Result<EngineExit, PipelineError> {
        debug!(executable = %self.executable.display(), args = %args.join(" "), "running docking engine");
        let output = Command::new(&self.executable)
            .args(args)
            .output()
            .map_err(|err| PipelineError::EngineLaunch(err.to_string()))?;
        if output.status.success() {
            return Ok(EngineExit::Success);
        }
        if killed_by_interrupt(&output.status) {
            return Ok(EngineExit::Interrupted);
        }
        Ok(EngineExit::Failed {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

impl DockingEngine for UniDockEngine {
    fn dock_batch(
        &self,
        config: &DockingConfig,
        ligand_index: &Path,
        output_dir: &Path,
    ) -> Result<EngineExit, PipelineError> {
        let mut args = self.common_args(config);
        args.push("--ligand_index".to_string());
        args.push(absolute(ligand_index));
        args.push("--dir".to_string());
        args.push(absolute(output_dir));
        self.run(&args)
    }

    fn dock_single(
        &self,
        config: &DockingConfig,
        ligand: &Path,
        output_file: &Path,
    ) -> Result<EngineExit, PipelineError> {
        let mut args = self.common_args(config);
        args.push("--ligand".to_string());
        args.push(absolute(ligand));
        args.push("--out".to_string());
        args.push(absolute(output_file));
        self.run(&args)
    }
}

fn absolute(path: &Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .to_string()
}

#[cfg(unix)]
fn killed_by_interrupt(status: &ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    // SIGINT, SIGTERM
    matches!(status.signal(), Some(2) | Some(15))
}

#[cfg(not(unix))]
fn killed_by_interrupt(_status: &ExitStatus) -> bool {
    false
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}
