// SPDX-License-Identifier: GPL-3.0-only

//! CLI export command
//!
//! Runs one export and prints a per-stream summary.

use capture_export::backends::recording::StreamKind;
use capture_export::config::ExportOptions;
use capture_export::pipelines::export::{ExportReport, export_recording};
use capture_export::preview::PreviewSink;
use capture_export::preview::terminal::TerminalPreview;
use tracing::warn;

/// Export every frame of the recording named in `options`
pub fn run_export(options: ExportOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut preview = if options.preview {
        match TerminalPreview::new() {
            Ok(preview) => Some(preview),
            Err(e) => {
                warn!(error = %e, "Terminal preview unavailable, exporting without it");
                None
            }
        }
    } else {
        None
    };

    let result = export_recording(
        &options,
        preview.as_mut().map(|p| p as &mut dyn PreviewSink),
    );
    // Leave the alternate screen before printing anything
    drop(preview);

    let report = result?;
    print_summary(&report);
    Ok(())
}

fn print_summary(report: &ExportReport) {
    println!("Exported {} captures to {}", report.captures, report.output_root.display());
    for kind in StreamKind::ALL {
        let Some(worker) = report.worker(kind) else {
            continue;
        };
        if worker.failed > 0 {
            println!("  {:<9} {} frames ({} failed)", kind.dir_name(), worker.written, worker.failed);
        } else {
            println!("  {:<9} {} frames", kind.dir_name(), worker.written);
        }
    }
    if report.skipped_depth > 0 {
        println!("  {} depth frames skipped (geometry mismatch)", report.skipped_depth);
    }
}
