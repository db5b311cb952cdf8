//! Process command - extract the fields of a single invoice.

use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use tracing::info;

use nfse_core::{DocumentOutcome, DocumentStatus, Field};

use super::{apply_overrides, build_extractor, load_config};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input PDF
    #[arg(required = true)]
    input: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Model directory
    #[arg(short, long)]
    model_dir: Option<PathBuf>,

    /// Skip OCR and use only the PDF text layer
    #[arg(long)]
    text_only: bool,

    /// Show how each page was read
    #[arg(long)]
    show_pages: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV row
    Csv,
    /// Plain text summary
    Text,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    apply_overrides(&mut config, args.model_dir.clone(), args.text_only);

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    info!("Processing file: {}", args.input.display());

    let input = args.input.clone();
    let outcome = tokio::task::spawn_blocking(move || build_extractor(&config).extract_path(&input))
        .await?;

    println!("{}", format_outcome(&outcome, args.format)?);

    if args.show_pages {
        eprintln!();
        for page in &outcome.pages {
            eprintln!(
                "{} page {}: {:?}, {} field(s)",
                style("ℹ").blue(),
                page.page,
                page.origin,
                page.fields_found
            );
        }
    }

    if let DocumentStatus::Failed(reason) = &outcome.status {
        eprintln!("{} {}", style("✗").red(), reason);
    }

    info!("Processed {} in {:?}", outcome.name, start.elapsed());
    Ok(())
}

fn format_outcome(outcome: &DocumentOutcome, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(outcome)?),
        OutputFormat::Csv => format_csv(outcome),
        OutputFormat::Text => Ok(format_text(outcome)),
    }
}

fn format_csv(outcome: &DocumentOutcome) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(Field::ALL.map(Field::column_name))?;
    wtr.write_record(outcome.record.to_row())?;
    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data.trim_end().to_string())
}

fn format_text(outcome: &DocumentOutcome) -> String {
    let mut output = String::new();

    output.push_str(&format!("File: {}\n", outcome.name));
    output.push_str(&format!("Status: {}\n\n", outcome.status.label()));
    for field in Field::ALL {
        output.push_str(&format!(
            "  {:<13} {}\n",
            format!("{}:", field.column_name()),
            outcome.record.get(field)
        ));
    }

    output.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfse_core::Record;

    fn outcome() -> DocumentOutcome {
        DocumentOutcome {
            name: "nota.pdf".to_string(),
            record: Record {
                hour: "10:15:30".to_string(),
                counterparty: "Acme Ltd".to_string(),
                description: "Consulting".to_string(),
                amount: "150,00".to_string(),
            },
            status: DocumentStatus::Complete,
            pages: Vec::new(),
        }
    }

    #[test]
    fn test_format_csv() {
        let csv = format_csv(&outcome()).unwrap();
        assert_eq!(
            csv,
            "hour,counterparty,description,amount\n10:15:30,Acme Ltd,Consulting,\"150,00\""
        );
    }

    #[test]
    fn test_format_text() {
        let text = format_text(&outcome());
        assert!(text.contains("Status: complete"));
        assert!(text.contains("counterparty: Acme Ltd"));
    }
}
