// SPDX-License-Identifier: GPL-3.0-only

//! Export configuration
//!
//! [`ExportOptions`] is what the user asked for on the command line.
//! [`RunConfig`] combines it with the recording's track configuration and is
//! read-only for the rest of the run.

use crate::backends::recording::types::{
    ColorFormat, RecordConfiguration, SampleFormat, StreamKind,
};
use crate::constants::{self, DEFAULT_INFRARED_QUALITY, RECORDING_EXTENSION};
use crate::errors::StartupError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// User-facing export options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Recording to export
    pub input: PathBuf,
    /// Rescale depth to 8 bits
    pub scaling: bool,
    /// Reproject depth into the color camera
    pub transform: bool,
    /// Infrared JPEG quality, clamped to 0-100 when resolved
    pub quality: i64,
    /// Show live preview windows
    pub preview: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            scaling: false,
            transform: false,
            quality: DEFAULT_INFRARED_QUALITY,
            preview: false,
        }
    }
}

impl ExportOptions {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            ..Default::default()
        }
    }

    /// Check that the input is an existing recording file
    pub fn validate(&self) -> Result<(), StartupError> {
        let has_extension = self
            .input
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(RECORDING_EXTENSION));
        if !self.input.is_file() || !has_extension {
            return Err(StartupError::InvalidInput(self.input.clone()));
        }
        Ok(())
    }

    /// `<input parent>/<input stem>`
    pub fn output_root(&self) -> PathBuf {
        let stem = self.input.file_stem().unwrap_or(self.input.as_os_str());
        self.input
            .parent()
            .unwrap_or(Path::new(""))
            .join(stem)
    }
}

/// Immutable configuration of one export run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub input: PathBuf,
    pub output_root: PathBuf,
    /// Enabled streams in export order
    pub streams: Vec<StreamKind>,
    pub scaling: bool,
    pub transform: bool,
    /// Infrared JPEG quality, 0-100
    pub quality: u8,
    pub preview: bool,
}

impl RunConfig {
    /// Combine options with the recording's track configuration
    ///
    /// Fails if an enabled track uses a format the exporter cannot write.
    pub fn resolve(
        options: &ExportOptions,
        record: &RecordConfiguration,
    ) -> Result<Self, StartupError> {
        if record.color_track_enabled {
            match &record.color_format {
                Some(ColorFormat::Mjpeg) => {}
                Some(ColorFormat::Other(codec)) => {
                    return Err(StartupError::UnsupportedColorFormat(codec.clone()));
                }
                None => return Err(StartupError::UnsupportedColorFormat("unknown".to_string())),
            }
        }
        for (kind, format) in [
            (StreamKind::Depth, &record.depth_format),
            (StreamKind::Infrared, &record.ir_format),
        ] {
            if !record.is_enabled(kind) {
                continue;
            }
            if let Some(SampleFormat::Other(name)) = format {
                return Err(StartupError::UnsupportedSampleFormat(format!(
                    "{} track uses {}",
                    kind, name
                )));
            }
        }

        let streams = StreamKind::ALL
            .into_iter()
            .filter(|&kind| record.is_enabled(kind))
            .collect();

        Ok(Self {
            input: options.input.clone(),
            output_root: options.output_root(),
            streams,
            scaling: options.scaling,
            transform: options.transform,
            quality: constants::clamp_quality(options.quality),
            preview: options.preview,
        })
    }

    pub fn is_enabled(&self, kind: StreamKind) -> bool {
        self.streams.contains(&kind)
    }

    /// Output directory of one stream
    pub fn stream_dir(&self, kind: StreamKind) -> PathBuf {
        self.output_root.join(kind.dir_name())
    }
}
