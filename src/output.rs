use std::io::{self, Write};

use serde::Serialize;

use crate::app::{DockResult, PrepareResult, ProgressEvent, ProgressSink, ResetResult, SplitResult};
use crate::extract::ExtractSummary;
use crate::fetch::FetchSummary;
use crate::scores::ResultsReport;
use crate::timing::format_duration;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_fetch(result: &FetchSummary) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_extract(result: &ExtractSummary) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_split(result: &SplitResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_prepare(result: &PrepareResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_dock(result: &DockResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_reset(result: &ResetResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_results(result: &ResultsReport) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

pub fn print_fetch_summary(result: &FetchSummary) {
    println!("{CYAN}Downloads{RESET}");
    println!("{GREEN}  downloaded: {} ({} bytes){RESET}", result.downloaded, result.bytes);
    println!("  already present: {}", result.skipped);
    if result.failed > 0 {
        println!("{YELLOW}  failed: {}{RESET}", result.failed);
        for failure in &result.failures {
            println!("{YELLOW}    {} ({}){RESET}", failure.url, failure.error);
        }
    }
    if let Some(reason) = &result.halted {
        println!("{RED}  halted: {reason}; {} not attempted{RESET}", result.cancelled);
    }
}

pub fn print_extract_summary(result: &ExtractSummary) {
    println!("{CYAN}Extraction{RESET}");
    println!("{GREEN}  extracted: {}{RESET}", result.extracted);
    println!("  already extracted: {}", result.skipped);
    if result.failed > 0 {
        println!("{YELLOW}  failed: {}{RESET}", result.failed);
    }
}

pub fn print_split_summary(result: &SplitResult) {
    println!("{CYAN}Splitting{RESET}");
    if let Some(existing) = &result.existing {
        println!(
            "  already split: {} molecules in {} tranches (use --force to redo)",
            existing.molecules, existing.tranches
        );
    }
    if let Some(summary) = &result.summary {
        println!(
            "{GREEN}  molecules: {} in {} tranches{RESET}",
            summary.molecules, summary.tranches
        );
        if summary.renamed > 0 {
            println!("{YELLOW}  renamed on collision: {}{RESET}", summary.renamed);
        }
        if summary.empty_records > 0 {
            println!("{YELLOW}  empty records skipped: {}{RESET}", summary.empty_records);
        }
        if summary.failed_files > 0 {
            println!("{YELLOW}  files that failed: {}{RESET}", summary.failed_files);
        }
    }
}

pub fn print_prepare_summary(result: &PrepareResult) {
    print_fetch_summary(&result.fetch);
    print_extract_summary(&result.extract);
    print_split_summary(&result.split);
}

pub fn print_dock_summary(result: &DockResult) {
    let summary = &result.summary;
    println!("{CYAN}Docking{RESET}");
    println!("  receptor: {}", result.receptor);
    println!("  outputs: {}", result.output_dir);
    println!(
        "{GREEN}  successful: {} of {}{RESET}",
        summary.successful(),
        summary.total
    );
    println!(
        "    previously completed: {}, outputs already present: {}, docked now: {}",
        summary.previously_completed, summary.already_docked, summary.docked
    );
    if summary.failed > 0 {
        println!("{YELLOW}  failed: {}{RESET}", summary.failed);
    }
    println!("  state: {}", result.state_file);
}

pub fn print_reset_summary(result: &ResetResult) {
    if result.removed {
        println!("{GREEN}Removed docking state {}{RESET}", result.state_file);
    } else {
        println!("No docking state at {}", result.state_file);
    }
}

pub fn print_results_summary(result: &ResultsReport) {
    println!(
        "{CYAN}Results: {} poses from {} files{RESET}",
        result.poses, result.files
    );
    for (rank, record) in result.best.iter().enumerate() {
        let ligand = match &record.tranche {
            Some(tranche) => format!("{tranche}/{}", record.ligand),
            None => record.ligand.clone(),
        };
        println!(
            "  {:>4}. {:<24} {:>8.2} kcal/mol (mode {})",
            rank + 1,
            ligand,
            record.affinity_kcal_mol,
            record.mode
        );
    }
}

pub fn print_elapsed(seconds: f64) {
    println!("  elapsed: {}", format_duration(seconds));
}
