use anyhow::{Context, Result};
use clap::Parser;
use pptx_combine::{collect_inputs, MergeConfig, Merger, Progress, SourceStatus};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

const DEFAULT_OUTPUT: &str = "combined_presentation.pptx";

/// Combine every .pptx and .pdf file in a folder into one presentation, keeping each file's own theme.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Folder with the presentations and PDFs to combine, merged in file name order
    #[arg(default_value = ".")]
    input_folder: PathBuf,

    /// Name of the merged presentation; ".pptx" is appended when missing
    #[arg(default_value = DEFAULT_OUTPUT)]
    output_filename: PathBuf,

    /// Take slide size and presentation properties from this file instead of the first input
    #[arg(short, long)]
    template: Option<PathBuf>,

    /// Leave speaker notes out of the merged presentation
    #[arg(long)]
    no_notes: bool,

    /// Program that renders PDF pages to PNG images
    #[arg(long, default_value = "pdftoppm")]
    pdf_renderer: PathBuf,

    /// Log every step of the merge
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    let output = with_pptx_extension(cli.output_filename);
    let inputs = collect_inputs(&cli.input_folder)
        .with_context(|| format!("Failed to read input folder {}", cli.input_folder.display()))?;

    println!("Found {} file(s) to combine in {}", inputs.len(), cli.input_folder.display());
    for path in &inputs {
        println!("  {}", path.display());
    }

    let mut config = MergeConfig::builder()
        .include_notes(!cli.no_notes)
        .pdf_renderer(cli.pdf_renderer);
    if let Some(template) = cli.template {
        config = config.template(template);
    }
    let config = config.build();

    let mut merger = Merger::new(&config).with_progress(|event| {
        if let Progress::SlideImported { source, slide, .. } = event {
            debug!(source = %source.display(), slide, "slide imported");
        }
    });
    let report = merger.run(&inputs, &output);

    for source in &report.result.sources {
        let name = source.path.display();
        match &source.status {
            SourceStatus::Merged => println!("merged   {name} ({} slides)", source.slides_merged),
            SourceStatus::Failed { reason, .. } => println!("skipped  {name}: {reason}"),
            SourceStatus::NotProcessed | SourceStatus::Pending => println!("not processed  {name}"),
        }
    }

    match report.outcome {
        Ok(()) => {
            println!(
                "Combined {} slides into {}",
                report.result.total_slides,
                output.display()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: {e}. Output not saved.");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn with_pptx_extension(path: PathBuf) -> PathBuf {
    let has_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pptx"))
        .unwrap_or(false);
    if has_extension {
        path
    } else {
        let mut name = path.into_os_string();
        name.push(".pptx");
        PathBuf::from(name)
    }
}
