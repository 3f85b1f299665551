use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use assert_matches::assert_matches;
use tranche_dock::domain::DownloadJob;
use tranche_dock::error::PipelineError;
use tranche_dock::fetch::{FetchExecutor, Fetcher, RetryPolicy, read_uri_list};
use tranche_dock::monitor::{FailureMonitor, HaltReason, MonitorPolicy};

/// Fails each URL with a transient error a configured number of times, permanently
/// for URLs containing "missing", and otherwise writes a small payload.
#[derive(Default)]
struct FlakyFetcher {
    transient_failures: HashMap<String, usize>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FlakyFetcher {
    fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

impl Fetcher for FlakyFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<u64, PipelineError> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(url.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        if url.contains("missing") {
            return Err(PipelineError::HttpStatus {
                status: 404,
                message: "not found".to_string(),
            });
        }
        if attempt <= self.transient_failures.get(url).copied().unwrap_or(0) {
            return Err(PipelineError::HttpStatus {
                status: 503,
                message: "busy".to_string(),
            });
        }
        fs::write(destination, b"payload").unwrap();
        Ok(7)
    }
}

fn jobs(dir: &Path, urls: &[&str]) -> Vec<DownloadJob> {
    urls.iter()
        .enumerate()
        .map(|(i, url)| DownloadJob::from_url(url, dir, i + 1).unwrap())
        .collect()
}

#[test]
fn transient_errors_are_retried() {
    let temp = tempfile::tempdir().unwrap();
    let url = "https://files.example.org/AA.xaa.pdbqt.gz";
    let fetcher = FlakyFetcher {
        transient_failures: HashMap::from([(url.to_string(), 2)]),
        ..FlakyFetcher::default()
    };
    let monitor = FailureMonitor::new(MonitorPolicy::default());
    let summary = FetchExecutor::new(&fetcher, &monitor, RetryPolicy::immediate(3), 2)
        .run(&jobs(temp.path(), &[url]))
        .unwrap();

    assert_eq!(summary.downloaded, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.bytes, 7);
    assert_eq!(fetcher.calls(url), 3);
    assert_eq!(monitor.counters().completed, 1);
    assert!(temp.path().join("AA.xaa.pdbqt.gz").is_file());
}

#[test]
fn retries_are_bounded_and_permanent_errors_fail_fast() {
    let temp = tempfile::tempdir().unwrap();
    let flaky = "https://files.example.org/BB.xaa.pdbqt.gz";
    let missing = "https://files.example.org/missing.xaa.pdbqt.gz";
    let fetcher = FlakyFetcher {
        transient_failures: HashMap::from([(flaky.to_string(), 10)]),
        ..FlakyFetcher::default()
    };
    let monitor = FailureMonitor::new(MonitorPolicy::default());
    let summary = FetchExecutor::new(&fetcher, &monitor, RetryPolicy::immediate(3), 2)
        .run(&jobs(temp.path(), &[flaky, missing]))
        .unwrap();

    assert_eq!(summary.failed, 2);
    assert_eq!(fetcher.calls(flaky), 4);
    assert_eq!(fetcher.calls(missing), 1);
    assert_eq!(summary.failures.len(), 2);
    let counters = monitor.counters();
    assert_eq!(counters.failed, 2);
    assert_eq!(counters.total_processed, 2);
}

#[test]
fn rerun_skips_existing_artifacts() {
    let temp = tempfile::tempdir().unwrap();
    let urls = [
        "https://files.example.org/AA.xaa.pdbqt.gz",
        "https://files.example.org/AA.xab.pdbqt.gz",
        "https://files.example.org/AA.xac.pdbqt.gz",
    ];
    let jobs = jobs(temp.path(), &urls);
    let fetcher = FlakyFetcher::default();

    let monitor = FailureMonitor::new(MonitorPolicy::default());
    let first = FetchExecutor::new(&fetcher, &monitor, RetryPolicy::immediate(0), 3)
        .run(&jobs)
        .unwrap();
    assert_eq!(first.downloaded, 3);

    let monitor = FailureMonitor::new(MonitorPolicy::default());
    let second = FetchExecutor::new(&fetcher, &monitor, RetryPolicy::immediate(0), 3)
        .run(&jobs)
        .unwrap();
    assert_eq!(second.skipped, 3);
    assert_eq!(second.downloaded, 0);
    assert_eq!(fetcher.total_calls(), 3);
    assert_eq!(monitor.counters().total_processed, 0);
}

#[test]
fn zero_byte_artifact_is_fetched_again() {
    let temp = tempfile::tempdir().unwrap();
    let url = "https://files.example.org/AA.xaa.pdbqt.gz";
    fs::write(temp.path().join("AA.xaa.pdbqt.gz"), b"").unwrap();
    let fetcher = FlakyFetcher::default();
    let monitor = FailureMonitor::new(MonitorPolicy::default());
    let summary = FetchExecutor::new(&fetcher, &monitor, RetryPolicy::immediate(0), 1)
        .run(&jobs(temp.path(), &[url]))
        .unwrap();
    assert_eq!(summary.downloaded, 1);
    assert_eq!(fetcher.calls(url), 1);
}

#[test]
fn halt_cancels_remaining_jobs() {
    let temp = tempfile::tempdir().unwrap();
    let urls: Vec<String> = (0..30)
        .map(|i| format!("https://files.example.org/missing/T{i:02}.xaa.pdbqt.gz"))
        .collect();
    let url_refs: Vec<&str> = urls.iter().map(String::as_str).collect();
    let fetcher = FlakyFetcher::default();
    let monitor = FailureMonitor::new(MonitorPolicy::default());

    // one worker keeps processing order deterministic
    let summary = FetchExecutor::new(&fetcher, &monitor, RetryPolicy::immediate(0), 1)
        .run(&jobs(temp.path(), &url_refs))
        .unwrap();

    assert_eq!(summary.failed, 10);
    assert_eq!(summary.cancelled, 20);
    assert_eq!(fetcher.total_calls(), 10);
    assert_matches!(
        summary.halted,
        Some(HaltReason::ConsecutiveFailures { count: 10, .. })
    );
}

#[test]
fn uri_list_parsing() {
    let temp = tempfile::tempdir().unwrap();
    let list = temp.path().join("ligands.uri");
    fs::write(
        &list,
        "# ZINC tranches\n\nhttps://files.example.org/AA.xaa.pdbqt.gz\nnot a url\n  http://files.example.org/dir/  \n",
    )
    .unwrap();
    let raw = temp.path().join("raw");
    let jobs = read_uri_list(&list, &raw).unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].destination, raw.join("AA.xaa.pdbqt.gz"));
    assert_eq!(jobs[1].destination, raw.join("downloaded_ligand_3.pdbqt.gz"));
    assert_eq!(jobs[1].url, "http://files.example.org/dir/");
}

#[test]
fn uri_list_errors() {
    let temp = tempfile::tempdir().unwrap();
    let missing = temp.path().join("none.uri");
    assert_matches!(
        read_uri_list(&missing, temp.path()),
        Err(PipelineError::MissingUriList(_))
    );

    let empty = temp.path().join("empty.uri");
    fs::write(&empty, "# nothing yet\n\n").unwrap();
    assert_matches!(
        read_uri_list(&empty, temp.path()),
        Err(PipelineError::EmptyUriList(_))
    );
}
