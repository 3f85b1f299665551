use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use rand::Rng;
use rayon::prelude::*;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::DownloadJob;
use crate::error::PipelineError;
use crate::monitor::{FailureMonitor, HaltReason, MonitorState, ProgressCounters, UnitOutcome};
use crate::store;

pub trait Fetcher: Send + Sync {
    /// Downloads `url` to `destination`, returning the number of bytes written.
    fn fetch(&self, url: &str, destination: &Path) -> Result<u64, PipelineError>;
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, PipelineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("tranche-dock/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| PipelineError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| PipelineError::Http(err.to_string()))?;
        Ok(Self { client })
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, PipelineError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "download request failed".to_string());
        Err(PipelineError::HttpStatus { status, message })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<u64, PipelineError> {
        let response = self.client.get(url).send().map_err(map_request_error)?;
        let mut response = Self::handle_status(response)?;
        let mut temp = store::temp_file_for(destination)?;
        let bytes = response
            .copy_to(temp.as_file_mut())
            .map_err(map_request_error)?;
        if bytes == 0 {
            return Err(PipelineError::Http(format!("empty response body from {url}")));
        }
        store::persist(temp, destination)?;
        Ok(bytes)
    }
}

fn map_request_error(err: reqwest::Error) -> PipelineError {
    if err.is_timeout() {
        PipelineError::Timeout(err.to_string())
    } else if err.is_builder() {
        PipelineError::InvalidUrl(err.to_string())
    } else {
        PipelineError::Http(err.to_string())
    }
}

/// Delays applied around each attempt. Ranges are in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base_secs: f64,
    pub jitter_secs: (f64, f64),
    pub politeness_secs: (f64, f64),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_secs: 3.0,
            jitter_secs: (1.0, 3.0),
            politeness_secs: (0.5, 2.0),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// No sleeping at all; for tests and local mirrors.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff_base_secs: 0.0,
            jitter_secs: (0.0, 0.0),
            politeness_secs: (0.0, 0.0),
        }
    }

    pub fn politeness_delay(&self) -> Duration {
        random_secs(self.politeness_secs)
    }

    /// Delay before retry number `attempt` (1-based): `base^attempt` plus jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.backoff_base_secs.powi(attempt as i32);
        Duration::from_secs_f64(base) + random_secs(self.jitter_secs)
    }
}

fn random_secs((low, high): (f64, f64)) -> Duration {
    if high <= low {
        return Duration::from_secs_f64(low.max(0.0));
    }
    Duration::from_secs_f64(rand::thread_rng().gen_range(low..=high))
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchFailure {
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchSummary {
    pub total: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub bytes: u64,
    pub counters: ProgressCounters,
    pub halted: Option<HaltReason>,
    pub failures: Vec<FetchFailure>,
}

#[derive(Debug)]
enum JobOutcome {
    Downloaded(u64),
    Skipped,
    Failed(String),
    Cancelled,
}

/// Bounded, retrying download pool. A destination that already exists with non-zero size
/// is skipped without touching the network or the monitor.
pub struct FetchExecutor<'a, F: Fetcher> {
    fetcher: &'a F,
    monitor: &'a FailureMonitor,
    retry: RetryPolicy,
    workers: usize,
}

impl<'a, F: Fetcher> FetchExecutor<'a, F> {
    pub fn new(fetcher: &'a F, monitor: &'a FailureMonitor, retry: RetryPolicy, workers: usize) -> Self {
        Self {
            fetcher,
            monitor,
            retry,
            workers: workers.max(1),
        }
    }

    pub fn run(&self, jobs: &[DownloadJob]) -> Result<FetchSummary, PipelineError> {
        for job in jobs {
            if let Some(parent) = job.destination.parent() {
                store::ensure_dir(parent)?;
            }
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|err| PipelineError::WorkerPool(err.to_string()))?;
        info!(jobs = jobs.len(), workers = self.workers, "starting downloads");

        let outcomes: Vec<(&DownloadJob, JobOutcome)> = pool.install(|| {
            jobs.par_iter()
                .with_max_len(1)
                .map(|job| (job, self.process(job)))
                .collect()
        });

        let mut summary = FetchSummary {
            total: jobs.len(),
            downloaded: 0,
            skipped: 0,
            failed: 0,
            cancelled: 0,
            bytes: 0,
            counters: self.monitor.counters(),
            halted: self.monitor.halt_reason(),
            failures: Vec::new(),
        };
        for (job, outcome) in outcomes {
            match outcome {
                JobOutcome::Downloaded(bytes) => {
                    summary.downloaded += 1;
                    summary.bytes += bytes;
                }
                JobOutcome::Skipped => summary.skipped += 1,
                JobOutcome::Cancelled => summary.cancelled += 1,
                JobOutcome::Failed(error) => {
                    summary.failed += 1;
                    summary.failures.push(FetchFailure {
                        url: job.url.clone(),
                        error,
                    });
                }
            }
        }
        info!(
            downloaded = summary.downloaded,
            skipped = summary.skipped,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "downloads finished"
        );
        Ok(summary)
    }

    fn process(&self, job: &DownloadJob) -> JobOutcome {
        if self.monitor.is_halted() {
            return JobOutcome::Cancelled;
        }
        if store::is_nonempty_file(&job.destination) {
            debug!(url = %job.url, "already downloaded");
            return JobOutcome::Skipped;
        }

        match self.fetch_with_retry(job) {
            Ok(bytes) => {
                let state = self.monitor.record(UnitOutcome::Success);
                debug!(url = %job.url, bytes, ?state, "downloaded");
                JobOutcome::Downloaded(bytes)
            }
            Err(err) => {
                let state = self.monitor.record(UnitOutcome::Failure);
                warn!(url = %job.url, "download failed: {err}");
                if state == MonitorState::Halted {
                    debug!("monitor halted; remaining queued downloads will be cancelled");
                }
                JobOutcome::Failed(err.to_string())
            }
        }
    }

    fn fetch_with_retry(&self, job: &DownloadJob) -> Result<u64, PipelineError> {
        let mut attempt = 0u32;
        loop {
            thread::sleep(self.retry.politeness_delay());
            match self.fetcher.fetch(&job.url, &job.destination) {
                Ok(bytes) => return Ok(bytes),
                Err(err) if err.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.backoff_delay(attempt);
                    debug!(
                        url = %job.url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure, retrying: {err}"
                    );
                    thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Reads a URI list: one URL per line, blank lines and `#` comments ignored.
pub fn read_uri_list(path: &Path, output_dir: &Path) -> Result<Vec<DownloadJob>, PipelineError> {
    if !path.exists() {
        return Err(PipelineError::MissingUriList(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)
        .map_err(|err| PipelineError::Filesystem(format!("read {}: {err}", path.display())))?;
    let mut jobs = Vec::new();
    let urls = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'));
    for (index, url) in urls.enumerate() {
        match DownloadJob::from_url(url, output_dir, index + 1) {
            Ok(job) => jobs.push(job),
            Err(err) => warn!("skipping URI list entry: {err}"),
        }
    }
    if jobs.is_empty() {
        return Err(PipelineError::EmptyUriList(path.to_path_buf()));
    }
    Ok(jobs)
}
