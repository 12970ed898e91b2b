// SPDX-License-Identifier: GPL-3.0-only

//! Capture Export - frame exporter for multi-sensor Matroska recordings
//!
//! Reads a recording holding color, depth and infrared tracks and writes
//! every frame of every enabled stream to its own image file.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Recording playback (Matroska demuxing, calibration)
//! - [`pipelines`]: Stream queues, export workers and the drain
//! - [`depth`]: Depth remapping into the color camera and 8-bit scaling
//! - [`preview`]: Optional live preview of ingested frames
//! - [`config`]: Export options and the per-run configuration
//!
//! # Example
//!
//! ```no_run
//! use capture_export::config::ExportOptions;
//! use capture_export::pipelines::export::export_recording;
//!
//! let options = ExportOptions {
//!     scaling: true,
//!     ..ExportOptions::new("session.mkv")
//! };
//! let report = export_recording(&options, None).expect("export failed");
//! println!("{} captures exported", report.captures);
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod depth;
pub mod errors;
pub mod pipelines;
pub mod preview;

// Re-export commonly used types
pub use backends::recording::{FrameSource, Playback, StreamKind};
pub use config::{ExportOptions, RunConfig};
pub use errors::{AppError, AppResult};
pub use pipelines::export::{ExportPipeline, ExportReport, export_recording};
