// SPDX-License-Identifier: GPL-3.0-only

use capture_export::config::ExportOptions;
use capture_export::constants::DEFAULT_INFRARED_QUALITY;
use clap::Parser;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "capture-export")]
#[command(about = "Export every frame of a multi-sensor Matroska recording as images")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Recording to export (.mkv)
    #[arg(short, long)]
    input: PathBuf,

    /// Rescale depth to 8 bits before export
    #[arg(short, long)]
    scaling: bool,

    /// Reproject depth into the color camera before export
    #[arg(short, long)]
    transform: bool,

    /// Infrared JPEG quality, clamped to 0-100
    #[arg(short, long, default_value_t = DEFAULT_INFRARED_QUALITY, allow_negative_numbers = true)]
    quality: i64,

    /// Show live preview windows in the terminal
    #[arg(short, long)]
    display: bool,
}

impl From<Cli> for ExportOptions {
    fn from(cli: Cli) -> Self {
        Self {
            input: cli.input,
            scaling: cli.scaling,
            transform: cli.transform,
            quality: cli.quality,
            preview: cli.display,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=capture_export=trace, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    cli::run_export(cli.into())
}
