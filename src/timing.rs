use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::info;

use crate::error::PipelineError;
use crate::store;

#[derive(Debug, Clone, Serialize)]
pub struct StepTiming {
    pub step: String,
    pub duration_seconds: f64,
    pub duration_formatted: String,
    pub percentage_of_total: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetrics {
    pub total_ligands_processed: usize,
    pub ligands_per_minute: f64,
    pub average_seconds_per_ligand: f64,
    pub estimated_time_for_1m_ligands: String,
    pub estimated_time_for_10m_ligands: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimingReport {
    pub stage: String,
    pub start_time: String,
    pub end_time: String,
    pub total_duration_seconds: f64,
    pub total_duration_formatted: String,
    pub step_timings: Vec<StepTiming>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance_metrics: Option<PerformanceMetrics>,
}

impl TimingReport {
    pub fn build(
        stage: &str,
        start: DateTime<Local>,
        end: DateTime<Local>,
        total: Duration,
        steps: &[(String, Duration)],
        processed: usize,
    ) -> Self {
        let total_secs = total.as_secs_f64();
        let step_timings = steps
            .iter()
            .map(|(step, duration)| {
                let secs = duration.as_secs_f64();
                StepTiming {
                    step: step.clone(),
                    duration_seconds: secs,
                    duration_formatted: format_duration(secs),
                    percentage_of_total: if total_secs > 0.0 {
                        secs / total_secs * 100.0
                    } else {
                        0.0
                    },
                }
            })
            .collect();
        let performance_metrics = (processed > 0 && total_secs > 0.0).then(|| {
            let per_minute = processed as f64 / total_secs * 60.0;
            PerformanceMetrics {
                total_ligands_processed: processed,
                ligands_per_minute: per_minute,
                average_seconds_per_ligand: total_secs / processed as f64,
                estimated_time_for_1m_ligands: format_duration(1_000_000.0 / per_minute * 60.0),
                estimated_time_for_10m_ligands: format_duration(10_000_000.0 / per_minute * 60.0),
            }
        });
        Self {
            stage: stage.to_string(),
            start_time: start.to_rfc3339(),
            end_time: end.to_rfc3339(),
            total_duration_seconds: total_secs,
            total_duration_formatted: format_duration(total_secs),
            step_timings,
            performance_metrics,
        }
    }
}

/// Wall-clock timing of one stage run, split into named steps.
pub struct TimingTracker {
    stage: String,
    started_at: DateTime<Local>,
    started: Instant,
    steps: Vec<(String, Duration)>,
    current: Option<(String, Instant)>,
    processed: usize,
}

impl TimingTracker {
    pub fn new(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            started_at: Local::now(),
            started: Instant::now(),
            steps: Vec::new(),
            current: None,
            processed: 0,
        }
    }

    /// Ends any running step first.
    pub fn start_step(&mut self, step: &str) {
        self.end_step();
        self.current = Some((step.to_string(), Instant::now()));
    }

    pub fn end_step(&mut self) {
        if let Some((step, started)) = self.current.take() {
            let elapsed = started.elapsed();
            info!(step = %step, duration = %format_duration(elapsed.as_secs_f64()), "step finished");
            self.steps.push((step, elapsed));
        }
    }

    /// Units successfully processed in this run; drives the performance metrics.
    pub fn set_processed(&mut self, count: usize) {
        self.processed = count;
    }

    pub fn finish(mut self) -> TimingReport {
        self.end_step();
        TimingReport::build(
            &self.stage,
            self.started_at,
            Local::now(),
            self.started.elapsed(),
            &self.steps,
            self.processed,
        )
    }

    pub fn report_path(&self, timing_dir: &Path) -> PathBuf {
        timing_dir.join(format!(
            "{}_{}.json",
            self.stage,
            self.started_at.format("%Y%m%d_%H%M%S")
        ))
    }

    /// Finishes the run and writes the report into `timing_dir`.
    pub fn finish_and_write(self, timing_dir: &Path) -> Result<(TimingReport, PathBuf), PipelineError> {
        let path = self.report_path(timing_dir);
        let report = self.finish();
        let json = serde_json::to_vec_pretty(&report)
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        store::write_bytes_atomic(&path, &json)?;
        info!(
            stage = %report.stage,
            total = %report.total_duration_formatted,
            report = %path.display(),
            "timing report written"
        );
        Ok((report, path))
    }
}

/// `12.3s`, `4m 5.0s`, `1h 2m 3.0s`
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{seconds:.1}s")
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor();
        format!("{}m {:.1}s", minutes as u64, seconds - minutes * 60.0)
    } else {
        let hours = (seconds / 3600.0).floor();
        let rest = seconds - hours * 3600.0;
        let minutes = (rest / 60.0).floor();
        format!(
            "{}h {}m {:.1}s",
            hours as u64,
            minutes as u64,
            rest - minutes * 60.0
        )
    }
}
