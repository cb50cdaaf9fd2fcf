//! Merges every presentation in a folder and reports progress per slide.
//!
//! Run with: cargo run --example merge_folder <folder> [output.pptx]

use pptx_combine::{collect_inputs, MergeConfig, Merger, Progress, Result, SourceStatus};
use std::env;
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let folder = if args.len() > 1 {
        PathBuf::from(&args[1])
    } else {
        eprintln!("Usage: cargo run --example merge_folder <folder> [output.pptx]");
        return Ok(());
    };
    let output = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("combined_presentation.pptx"));

    let inputs = collect_inputs(&folder)?;
    println!("Merging {} files from {}", inputs.len(), folder.display());

    // Notes are left out and preparation stays on this thread
    let config = MergeConfig::builder()
        .include_notes(false)
        .parallel(false)
        .build();

    let mut merger = Merger::new(&config).with_progress(|event| match event {
        Progress::SlideImported { source, slide, result } => {
            println!("  {} slide {} (total {})", file_name(source), slide, result.total_slides);
        }
        Progress::SourceFinished { source, .. } => println!("finished {}", file_name(source)),
    });
    let report = merger.run(&inputs, &output);

    for source in report.result.failed() {
        if let SourceStatus::Failed { kind, reason } = &source.status {
            println!("{:?}: {} ({})", kind, file_name(&source.path), reason);
        }
    }
    report.outcome?;
    println!("Saved {} slides to {}", report.result.total_slides, output.display());

    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
