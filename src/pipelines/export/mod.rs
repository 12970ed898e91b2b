// SPDX-License-Identifier: GPL-3.0-only

//! Frame export pipeline
//!
//! ```text
//! FrameSource ──▶ Ingestor ──▶ StreamQueue (color)    ──▶ ExportWorker ──▶ color/*.jpg
//!  (main thread)   │      └──▶ StreamQueue (depth)    ──▶ ExportWorker ──▶ depth/*.png
//!                  │      └──▶ StreamQueue (infrared) ──▶ ExportWorker ──▶ infrared/*.jpg
//!                  └──▶ PreviewSink (optional)
//! ```
//!
//! Workers start before the first capture is read and are joined by the
//! drain: the quit flag is set once, then every worker finishes its queue.

pub mod encoding;
pub mod ingest;
pub mod queue;
pub mod worker;

pub use encoding::{ColorPassthrough, DepthPngEncoder, FrameEncoder, InfraredJpegEncoder};
pub use ingest::{IngestStep, Ingestor};
pub use queue::{StreamFrame, StreamQueue};
pub use worker::{ExportWorker, QuitFlag, WorkerReport};

use crate::backends::recording::types::StreamKind;
use crate::backends::recording::{FrameSource, Playback};
use crate::config::{ExportOptions, RunConfig};
use crate::depth::DepthRemapper;
use crate::errors::{AppResult, RecordingError, StartupError};
use crate::preview::PreviewSink;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why ingestion ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    EndOfStream,
    /// Stopped from the preview before the end of the recording
    Stopped,
}

/// Summary of a drained run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub output_root: PathBuf,
    pub captures: u64,
    /// Depth frames not exported because they could not be remapped
    pub skipped_depth: u64,
    pub workers: Vec<WorkerReport>,
}

impl ExportReport {
    pub fn worker(&self, kind: StreamKind) -> Option<&WorkerReport> {
        self.workers.iter().find(|w| w.kind == kind)
    }

    pub fn failed(&self) -> u64 {
        self.workers.iter().map(|w| w.failed).sum()
    }
}

/// Encode policy for one stream
pub fn encoder_for(kind: StreamKind, config: &RunConfig) -> Box<dyn FrameEncoder> {
    match kind {
        StreamKind::Color => Box::new(ColorPassthrough),
        StreamKind::Depth => Box::new(DepthPngEncoder {
            scale_to_8bit: config.scaling,
        }),
        StreamKind::Infrared => Box::new(InfraredJpegEncoder {
            quality: config.quality,
        }),
    }
}

/// Create the output root and one directory per enabled stream
///
/// An existing output root is refused so two exports never mix.
pub fn create_output_layout(config: &RunConfig) -> Result<(), StartupError> {
    if config.output_root.exists() {
        return Err(StartupError::OutputExists(config.output_root.clone()));
    }
    let create = |path: &Path| {
        std::fs::create_dir_all(path).map_err(|e| StartupError::OutputDirectory {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    };
    create(&config.output_root)?;
    for &kind in &config.streams {
        create(&config.stream_dir(kind))?;
    }
    debug!(root = %config.output_root.display(), streams = config.streams.len(), "Created output layout");
    Ok(())
}

/// A running export: workers started, ready to ingest
pub struct ExportPipeline {
    config: RunConfig,
    quit: QuitFlag,
    workers: Vec<ExportWorker>,
    ingestor: Ingestor,
    drained: bool,
}

impl ExportPipeline {
    /// Prepare the remapper and output layout, then start one worker per stream
    pub fn start(config: RunConfig, source: &dyn FrameSource) -> Result<Self, StartupError> {
        let remapper = if config.transform && config.is_enabled(StreamKind::Depth) {
            let calibration = source.calibration().ok_or_else(|| {
                StartupError::MissingCalibration(
                    "recording has no usable calibration attachment".to_string(),
                )
            })?;
            let remapper = DepthRemapper::new(calibration);
            info!(
                from = %remapper.depth_resolution(),
                to = %remapper.color_resolution(),
                "Depth will be transformed into the color camera"
            );
            Some(remapper)
        } else {
            if config.transform {
                warn!("Transform requested but the recording has no depth track");
            }
            None
        };

        create_output_layout(&config)?;

        let quit = QuitFlag::new();
        let mut queues = Vec::with_capacity(config.streams.len());
        let mut workers = Vec::with_capacity(config.streams.len());
        for &kind in &config.streams {
            let queue = Arc::new(StreamQueue::new(kind));
            let started = ExportWorker::start(
                encoder_for(kind, &config),
                Arc::clone(&queue),
                config.stream_dir(kind),
                quit.clone(),
            );
            match started {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    // Workers already running must still be told to stop
                    quit.request();
                    drop(workers);
                    return Err(e);
                }
            }
            queues.push(queue);
        }

        Ok(Self {
            ingestor: Ingestor::new(queues, remapper),
            config,
            quit,
            workers,
            drained: false,
        })
    }

    /// Run the ingestion loop until the recording ends or the preview stops it
    ///
    /// A read error ends ingestion early; the caller still drains with
    /// [`ExportPipeline::finish`] (or by dropping the pipeline).
    pub fn ingest(
        &mut self,
        source: &mut dyn FrameSource,
        mut preview: Option<&mut dyn PreviewSink>,
    ) -> Result<IngestOutcome, RecordingError> {
        loop {
            let sink = preview.as_mut().map(|p| &mut **p as &mut dyn PreviewSink);
            match self.ingestor.step(source, sink)? {
                IngestStep::Captured { .. } => {}
                IngestStep::Stopped => {
                    info!(captures = self.ingestor.captures(), "Export stopped from preview");
                    return Ok(IngestOutcome::Stopped);
                }
                IngestStep::EndOfStream => {
                    info!(captures = self.ingestor.captures(), "End of recording");
                    return Ok(IngestOutcome::EndOfStream);
                }
            }
        }
    }

    /// Signal quit and wait for every worker to drain its queue
    pub fn finish(mut self) -> ExportReport {
        let workers = self.drain();
        ExportReport {
            output_root: self.config.output_root.clone(),
            captures: self.ingestor.captures(),
            skipped_depth: self.ingestor.skipped_depth(),
            workers,
        }
    }

    fn drain(&mut self) -> Vec<WorkerReport> {
        if self.drained {
            return Vec::new();
        }
        self.drained = true;
        debug!(workers = self.workers.len(), "Draining export workers");
        self.quit.request();
        std::mem::take(&mut self.workers)
            .into_iter()
            .map(ExportWorker::join)
            .collect()
    }
}

impl Drop for ExportPipeline {
    fn drop(&mut self) {
        if !self.drained {
            self.drain();
        }
    }
}

/// Export a recording end to end
///
/// Opens the recording, starts the workers, ingests until end of stream
/// (or until the preview stops it) and drains. A read error mid-recording
/// is returned after everything already queued has been written.
pub fn export_recording(
    options: &ExportOptions,
    preview: Option<&mut dyn PreviewSink>,
) -> AppResult<ExportReport> {
    options.validate()?;
    let mut playback = Playback::open(&options.input).map_err(StartupError::OpenFailed)?;
    let config = RunConfig::resolve(options, playback.record_configuration())?;
    info!(
        input = %config.input.display(),
        output = %config.output_root.display(),
        scaling = config.scaling,
        transform = config.transform,
        quality = config.quality,
        "Starting export"
    );

    let mut pipeline = ExportPipeline::start(config, &playback)?;
    let outcome = pipeline.ingest(&mut playback, preview);
    let report = pipeline.finish();
    playback.close();

    match outcome {
        Ok(_) => Ok(report),
        Err(e) => {
            warn!(
                error = %e,
                captures = report.captures,
                "Recording ended with an error, queued frames were written"
            );
            Err(e.into())
        }
    }
}
