//! Batch command - extract every invoice in a folder and append the rows.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use glob::{glob_with, MatchOptions, Pattern};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{debug, warn};

use nfse_core::{BatchReport, CsvSink, DocumentStatus, NfseConfig, RowSink};

use super::{apply_overrides, build_extractor, load_config};
use crate::sinks::{JsonSink, SheetsSink};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Folder containing the invoices (default: input.folder from config)
    input: Option<PathBuf>,

    /// Where rows are appended
    #[arg(short, long, value_enum, default_value = "csv")]
    sink: SinkKind,

    /// CSV file for the csv sink
    #[arg(short, long, default_value = "nfse.csv")]
    output: PathBuf,

    /// Also write a JSON report with per-document status
    #[arg(long)]
    report: Option<PathBuf>,

    /// Model directory
    #[arg(short, long)]
    model_dir: Option<PathBuf>,

    /// Skip OCR and use only the PDF text layer
    #[arg(long)]
    text_only: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum SinkKind {
    /// Append to a CSV file
    Csv,
    /// Print rows as JSON on stdout
    Json,
    /// Append to the configured Google Sheets range
    Sheets,
}

/// Report file contents.
#[derive(Serialize)]
struct ReportFile<'a> {
    generated_at: String,
    documents: usize,
    complete: usize,
    partial: usize,
    no_marker: usize,
    failed: usize,
    total_amount: String,
    #[serde(flatten)]
    report: &'a BatchReport,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    apply_overrides(&mut config, args.model_dir.clone(), args.text_only);

    let folder = args.input.clone().unwrap_or_else(|| config.input.folder.clone());
    let files = list_documents(&folder, &config.input.extension)?;

    if files.is_empty() {
        println!(
            "{} No .{} files found in {}",
            style("ℹ").blue(),
            config.input.extension,
            folder.display()
        );
        return Ok(());
    }

    // Stdout belongs to the rows when the JSON sink is used
    let quiet = args.sink == SinkKind::Json;
    if !quiet {
        println!("{} Found {} files to process", style("ℹ").blue(), files.len());
    }

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
                .progress_chars("=>-"),
        );
        pb
    };

    let sink_kind = args.sink;
    let output = args.output.clone();
    let pb = progress.clone();
    let (report, written) = tokio::task::spawn_blocking(move || -> anyhow::Result<(BatchReport, usize)> {
        let mut sink = open_sink(sink_kind, &output, &config)?;
        let extractor = build_extractor(&config);
        let report = extractor.extract_batch_with(&files, |_| pb.inc(1));
        pb.finish_and_clear();
        let written = report.write_to(sink.as_mut())?;
        Ok((report, written))
    })
    .await??;

    if let Some(path) = &args.report {
        write_report(path, &report)?;
    }

    if quiet {
        return Ok(());
    }

    println!();
    println!(
        "{} Processed {} files in {:?}, {} rows appended to {}",
        style("✓").green(),
        report.len(),
        start.elapsed(),
        written,
        match args.sink {
            SinkKind::Csv => args.output.display().to_string(),
            SinkKind::Json => "stdout".to_string(),
            SinkKind::Sheets => "spreadsheet".to_string(),
        }
    );
    println!(
        "   {} complete, {} partial, {} without marker, {} failed",
        style(report.count("complete")).green(),
        style(report.count("partial")).yellow(),
        style(report.count("no_marker")).yellow(),
        style(report.count("failed")).red()
    );
    println!("   Total amount: {}", report.total_amount());

    let failed: Vec<_> = report
        .outcomes
        .iter()
        .filter_map(|o| match &o.status {
            DocumentStatus::Failed(reason) => Some((o.name.as_str(), reason.as_str())),
            _ => None,
        })
        .collect();

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for (name, reason) in failed {
            println!("  - {}: {}", name, reason);
        }
    }

    Ok(())
}

/// Documents directly inside `folder` with the given extension, sorted by path.
fn list_documents(folder: &Path, extension: &str) -> anyhow::Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        anyhow::bail!("Input folder not found: {}", folder.display());
    }

    let pattern = format!(
        "{}/*.{}",
        Pattern::escape(&folder.to_string_lossy()),
        Pattern::escape(extension.trim_start_matches('.'))
    );
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };

    let mut files: Vec<PathBuf> = glob_with(&pattern, options)?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    debug!("Matched {} files with {}", files.len(), pattern);
    Ok(files)
}

fn open_sink(kind: SinkKind, output: &Path, config: &NfseConfig) -> anyhow::Result<Box<dyn RowSink>> {
    Ok(match kind {
        SinkKind::Csv => {
            let has_header = fs::metadata(output).map(|m| m.len() > 0).unwrap_or(false);
            let file = OpenOptions::new().create(true).append(true).open(output)?;
            let sink = CsvSink::new(file);
            Box::new(if has_header { sink.without_header() } else { sink })
        }
        SinkKind::Json => Box::new(JsonSink::new(std::io::stdout())),
        SinkKind::Sheets => Box::new(SheetsSink::from_config(&config.sink)?),
    })
}

fn write_report(path: &Path, report: &BatchReport) -> anyhow::Result<()> {
    let file = ReportFile {
        generated_at: chrono::Local::now().to_rfc3339(),
        documents: report.len(),
        complete: report.count("complete"),
        partial: report.count("partial"),
        no_marker: report.count("no_marker"),
        failed: report.count("failed"),
        total_amount: report.total_amount().to_string(),
        report,
    };
    fs::write(path, serde_json::to_string_pretty(&file)?)?;
    debug!("Wrote report to {}", path.display());
    Ok(())
}
