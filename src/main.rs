//! # Boxlabel CLI
//!
//! Usage:
//!   boxlabel items.xlsx -o labels.pdf
//!   boxlabel items.csv -t nested -c config.json --skip-invalid
//!   boxlabel --print-config > config.json

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use boxlabel::{
    source, ConfigOptions, ErrorPolicy, FontContext, FontSource, LabelError, RenderOptions,
    TemplateConfig, TemplateKind,
};

#[derive(Parser)]
#[command(name = "boxlabel")]
#[command(about = "Render spreadsheet rows into printable PDF box labels")]
struct Cli {
    /// Input spreadsheet (.csv, .xlsx, .xls or .ods)
    #[arg(required_unless_present = "print_config")]
    input: Option<PathBuf>,

    /// Output PDF (defaults to the input name with a .pdf extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Label template, overrides the config file
    #[arg(short, long)]
    template: Option<TemplateKind>,

    /// JSON file with template options
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Worksheet to read from a workbook (first sheet by default)
    #[arg(long)]
    sheet: Option<String>,

    /// Rows of boxes per page
    #[arg(long)]
    rows: Option<u32>,

    /// Columns of boxes per page
    #[arg(long)]
    columns: Option<u32>,

    /// Leave out invalid records instead of failing the whole run
    #[arg(long)]
    skip_invalid: bool,

    /// Directory holding cjk-regular.ttf and cjk-bold.ttf
    #[arg(long)]
    fonts: Option<PathBuf>,

    /// Print the effective options as JSON and exit
    #[arg(long)]
    print_config: bool,
}

fn main() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("boxlabel=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("✗ {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), LabelError> {
    let mut options = match &cli.config {
        Some(path) => {
            let json = fs::read_to_string(path).map_err(|e| {
                LabelError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
            })?;
            ConfigOptions::from_json(&json)?
        }
        None => ConfigOptions::default(),
    };
    if let Some(template) = cli.template {
        options.template = template;
    }
    if let Some(rows) = cli.rows {
        options.rows = rows;
    }
    if let Some(columns) = cli.columns {
        options.columns = columns;
    }

    if cli.print_config {
        let json = serde_json::to_string_pretty(&options)
            .map_err(|e| LabelError::InvalidConfig(e.to_string()))?;
        println!("{}", json);
        return Ok(());
    }

    let config = TemplateConfig::new(options)?;
    let Some(input) = cli.input else {
        return Err(LabelError::InvalidConfig("no input file given".to_string()));
    };
    let output = cli
        .output
        .unwrap_or_else(|| input.with_extension("pdf"));

    let rows = source::read_rows(&input, cli.sheet.as_deref())?;
    let fonts = FontContext::new(match &cli.fonts {
        Some(dir) => FontSource::from_dir(dir),
        None => FontSource::default_files(),
    });
    let policy = if cli.skip_invalid {
        ErrorPolicy::SkipRecord
    } else {
        ErrorPolicy::Abort
    };

    let report = boxlabel::render_to_file(
        &rows,
        &config,
        &fonts,
        RenderOptions {
            policy,
            ..Default::default()
        },
        &output,
    )?;

    for warning in &report.warnings {
        eprintln!("! {}", warning);
    }
    for skipped in &report.skipped {
        eprintln!("! skipped row {}: {}", skipped.row, skipped.error);
    }
    eprintln!(
        "✓ Written {} labels on {} pages ({} bytes) to {}",
        report.records,
        report.pages,
        report.pdf.len(),
        output.display()
    );
    Ok(())
}
