// SPDX-License-Identifier: GPL-3.0-only

//! Ingestion loop
//!
//! The single producer: advances the frame source one capture at a time,
//! copies out the enabled streams' images and pushes them onto their queues.
//! Depth is remapped into the color camera first when a remapper is set.

use super::queue::{StreamFrame, StreamQueue};
use crate::backends::recording::types::{Capture, ImageData, StreamKind};
use crate::backends::recording::FrameSource;
use crate::depth::DepthRemapper;
use crate::errors::RecordingError;
use crate::preview::{self, PreviewKey, PreviewRaster, PreviewSink};
use std::sync::Arc;
use tracing::{trace, warn};

/// Result of one ingestion step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStep {
    /// A capture was read; `pushed` frames were queued
    Captured { pushed: usize },
    /// The preview asked to stop
    Stopped,
    EndOfStream,
}

/// Per-run ingestion state
pub struct Ingestor {
    queues: [Option<Arc<StreamQueue>>; 3],
    remapper: Option<DepthRemapper>,
    captures: u64,
    skipped_depth: u64,
}

impl Ingestor {
    /// `queues` holds one queue per enabled stream
    pub fn new(queues: Vec<Arc<StreamQueue>>, remapper: Option<DepthRemapper>) -> Self {
        let mut slots: [Option<Arc<StreamQueue>>; 3] = Default::default();
        for queue in queues {
            let index = queue.kind().index();
            slots[index] = Some(queue);
        }
        Self {
            queues: slots,
            remapper,
            captures: 0,
            skipped_depth: 0,
        }
    }

    /// Captures read so far
    pub fn captures(&self) -> u64 {
        self.captures
    }

    /// Depth frames dropped because they did not fit the remapper
    pub fn skipped_depth(&self) -> u64 {
        self.skipped_depth
    }

    /// Read one capture and queue its frames
    pub fn step(
        &mut self,
        source: &mut dyn FrameSource,
        preview: Option<&mut dyn PreviewSink>,
    ) -> Result<IngestStep, RecordingError> {
        let Some(capture) = source.advance()? else {
            return Ok(IngestStep::EndOfStream);
        };
        self.captures += 1;

        let frames = self.extract(&capture);
        // Frames own their data, the capture can go before anything is queued
        drop(capture);

        let pushed = frames.len();
        let mut stop = false;
        if let Some(preview) = preview {
            stop = self.show(preview, &frames);
        }
        for frame in frames {
            if let Some(queue) = &self.queues[frame.kind.index()] {
                queue.push(frame);
            }
        }

        trace!(capture = self.captures, pushed, "Capture queued");
        Ok(if stop {
            IngestStep::Stopped
        } else {
            IngestStep::Captured { pushed }
        })
    }

    /// Copy the enabled streams out of a capture, remapping depth if requested
    fn extract(&mut self, capture: &Capture) -> Vec<StreamFrame> {
        let mut frames = Vec::with_capacity(3);
        for kind in StreamKind::ALL {
            if self.queues[kind.index()].is_none() {
                continue;
            }
            let Some(image) = capture.image(kind) else {
                continue;
            };

            let mut frame = StreamFrame {
                kind,
                device_timestamp_usec: image.device_timestamp_usec,
                resolution: image.resolution,
                data: image.data.clone(),
            };

            if kind == StreamKind::Depth
                && let Some(remapper) = &self.remapper
            {
                let remapped = match &frame.data {
                    ImageData::Gray16(samples) => remapper.remap(samples),
                    ImageData::Encoded(_) => None,
                };
                let Some(remapped) = remapped else {
                    self.skipped_depth += 1;
                    warn!(
                        timestamp = frame.device_timestamp_usec,
                        samples = frame.data.len(),
                        expected = %remapper.depth_resolution(),
                        "Depth frame does not match calibration, skipping"
                    );
                    continue;
                };
                frame.resolution = remapper.color_resolution();
                frame.data = ImageData::Gray16(Arc::from(remapped));
            }

            frames.push(frame);
        }
        frames
    }

    /// Show frames in the preview; true when the user asked to stop
    fn show(&self, preview: &mut dyn PreviewSink, frames: &[StreamFrame]) -> bool {
        let transformed = self.remapper.is_some();
        for frame in frames {
            let Some(raster) = PreviewRaster::from_frame(frame) else {
                continue;
            };
            if let Err(e) = preview.show_image(preview::window_name(frame.kind, transformed), raster)
            {
                warn!(error = %e, "Preview failed");
            }
        }
        match preview.poll_key() {
            Ok(Some(PreviewKey::Quit)) => true,
            Ok(_) => false,
            Err(e) => {
                warn!(error = %e, "Preview input failed");
                false
            }
        }
    }
}
